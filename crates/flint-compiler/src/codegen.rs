//! Lowering from the syntax tree to instruction sequences.
//!
//! Each compilation unit (the module, and every function body) gets its
//! own [`InstructionSequence`] and [`CodeUnitMetadata`]. Function
//! definitions recurse through the whole pipeline: the body is lowered,
//! optimized, and assembled into a finished [`CodeObject`] that lands in
//! the enclosing unit's constant pool, so by the time the enclosing unit
//! assembles, its nested units are already done.
//!
//! Name resolution is scope-based: function bodies pre-scan their
//! statements for assigned names, which become frame slots addressed with
//! the fast opcodes; everything else goes through the name table. At
//! module scope a name normally resolves by name lookup unless a
//! fast-local override is active for it.

use std::sync::Arc;

use flint_core::{CompileError, FeatureFlags, NO_LOCATION, SrcLocation};

use crate::assemble::assemble;
use crate::ast::{BinOp, Expr, Literal, Module, Stmt, UnaryOp};
use crate::cfg::ControlFlowGraph;
use crate::code::CodeObject;
use crate::instruction::InstructionSequence;
use crate::metadata::{CodeUnitMetadata, Constant};
use crate::opcode::Opcode;
use crate::optimize::optimize_code_unit;

/// Maximum depth of nested function definitions.
pub const MAX_NESTING: usize = 64;

/// One in-progress compilation unit.
struct Unit {
    metadata: CodeUnitMetadata,
    seq: InstructionSequence,
}

/// Drives lowering, optimization, and assembly for a module and every
/// unit nested inside it.
pub struct Compiler {
    filename: String,
    optimize: u8,
    flags: FeatureFlags,
    nesting: usize,
}

impl Compiler {
    /// A compiler for one source file.
    pub fn new(filename: impl Into<String>, optimize: u8, flags: FeatureFlags) -> Self {
        Self {
            filename: filename.into(),
            optimize,
            flags,
            nesting: 0,
        }
    }

    /// Compile a module to its finished code object.
    pub fn compile_module(&mut self, module: &Module<'_>) -> Result<CodeObject, CompileError> {
        let unit = self.module_unit(module)?;
        self.finish_unit(unit)
    }

    /// Lower a module, returning the open sequence and metadata without
    /// optimizing or assembling.
    pub fn generate_module(
        &mut self,
        module: &Module<'_>,
    ) -> Result<(InstructionSequence, CodeUnitMetadata), CompileError> {
        let unit = self.module_unit(module)?;
        Ok((unit.seq, unit.metadata))
    }

    fn module_unit(&mut self, module: &Module<'_>) -> Result<Unit, CompileError> {
        let mut unit = Unit {
            metadata: CodeUnitMetadata::new("<module>", 1),
            seq: InstructionSequence::new(),
        };
        self.compile_body(&mut unit, &module.body)?;
        self.emit_implicit_return(&mut unit)?;
        Ok(unit)
    }

    /// Optimize and assemble a fully lowered unit.
    fn finish_unit(&mut self, unit: Unit) -> Result<CodeObject, CompileError> {
        let Unit { metadata, seq } = unit;
        let resolved = seq.finalize()?;
        let mut graph = ControlFlowGraph::from_sequence(&resolved)?;
        optimize_code_unit(
            &mut graph,
            metadata.consts(),
            metadata.varnames().len() as u32,
            self.optimize,
        )?;
        let linear = graph.to_sequence()?;
        assemble(&metadata, &self.filename, &linear)
    }

    fn compile_body(&mut self, unit: &mut Unit, stmts: &[Stmt<'_>]) -> Result<(), CompileError> {
        let mut stmts = stmts;
        // A leading string expression is a docstring; drop it when asked.
        if self.flags.contains(FeatureFlags::NO_DOCSTRINGS)
            && let Some(Stmt::Expr {
                value: Expr::Literal {
                    value: Literal::Str(_),
                    ..
                },
            }) = stmts.first()
        {
            stmts = &stmts[1..];
        }
        for stmt in stmts {
            self.compile_stmt(unit, stmt)?;
        }
        Ok(())
    }

    fn compile_stmt(&mut self, unit: &mut Unit, stmt: &Stmt<'_>) -> Result<(), CompileError> {
        match stmt {
            Stmt::Expr { value } => {
                self.compile_expr(unit, value)?;
                unit.seq.add_op(Opcode::PopTop, 0, value.location())
            }
            Stmt::Assign {
                name,
                value,
                location,
            } => {
                self.compile_expr(unit, value)?;
                self.store_name(unit, name, *location)
            }
            Stmt::If {
                test,
                body,
                orelse,
                location,
            } => {
                let orelse_label = unit.seq.new_label()?;
                let end = unit.seq.new_label()?;
                self.compile_expr(unit, test)?;
                unit.seq
                    .add_jump(Opcode::PopJumpIfFalse, orelse_label, *location)?;
                self.compile_body(unit, body)?;
                unit.seq.add_jump(Opcode::Jump, end, NO_LOCATION)?;
                unit.seq.use_label(orelse_label)?;
                self.compile_body(unit, orelse)?;
                unit.seq.use_label(end)
            }
            Stmt::While {
                test,
                body,
                location,
            } => {
                let start = unit.seq.new_label()?;
                let end = unit.seq.new_label()?;
                unit.seq.use_label(start)?;
                self.compile_expr(unit, test)?;
                unit.seq.add_jump(Opcode::PopJumpIfFalse, end, *location)?;
                self.compile_body(unit, body)?;
                unit.seq.add_jump(Opcode::Jump, start, NO_LOCATION)?;
                unit.seq.use_label(end)
            }
            Stmt::Return { value, location } => {
                if !unit.metadata.is_function {
                    return Err(CompileError::user("'return' outside function", *location));
                }
                match value {
                    Some(value) => self.compile_expr(unit, value)?,
                    None => self.emit_load_const(unit, Constant::None, *location)?,
                }
                unit.seq.add_op(Opcode::ReturnValue, 0, *location)
            }
            Stmt::Raise { exc, location } => match exc {
                Some(exc) => {
                    self.compile_expr(unit, exc)?;
                    unit.seq.add_op(Opcode::RaiseVarargs, 1, *location)
                }
                None => unit.seq.add_op(Opcode::RaiseVarargs, 0, *location),
            },
            Stmt::Try {
                body,
                handler,
                location,
            } => {
                // Statements keep the stack empty, so the protected region
                // starts at depth zero and the handler sees just the
                // pushed exception.
                let handler_label = unit.seq.new_label()?;
                let end = unit.seq.new_label()?;
                unit.seq
                    .add_setup_handler(handler_label, 0, false, *location)?;
                self.compile_body(unit, body)?;
                unit.seq.add_pop_handler(*location)?;
                unit.seq.add_jump(Opcode::Jump, end, NO_LOCATION)?;
                unit.seq.use_label(handler_label)?;
                unit.seq.add_op(Opcode::PopTop, 0, *location)?;
                self.compile_body(unit, handler)?;
                unit.seq.use_label(end)
            }
            Stmt::FunctionDef {
                name,
                params,
                body,
                location,
            } => {
                let code = self.compile_function(unit, name, params, body, *location)?;
                self.emit_load_const(unit, Constant::Code(code), *location)?;
                unit.seq.add_op(Opcode::MakeFunction, 0, *location)?;
                self.store_name(unit, name, *location)
            }
            Stmt::Pass { .. } => Ok(()),
        }
    }

    fn compile_expr(&mut self, unit: &mut Unit, expr: &Expr<'_>) -> Result<(), CompileError> {
        match expr {
            Expr::Literal { value, location } => {
                let constant = match value {
                    Literal::None => Constant::None,
                    Literal::Bool(b) => Constant::Bool(*b),
                    Literal::Int(v) => Constant::Int(*v),
                    Literal::Float(v) => Constant::Float(*v),
                    Literal::Str(s) => Constant::Str((*s).to_owned()),
                };
                self.emit_load_const(unit, constant, *location)
            }
            Expr::Name { name, location } => self.load_name(unit, name, *location),
            Expr::Unary {
                op,
                operand,
                location,
            } => {
                self.compile_expr(unit, operand)?;
                let opcode = match op {
                    UnaryOp::Neg => Opcode::UnaryNegative,
                    UnaryOp::Not => Opcode::UnaryNot,
                };
                unit.seq.add_op(opcode, 0, *location)
            }
            Expr::Binary {
                op,
                left,
                right,
                location,
            } => {
                self.compile_expr(unit, left)?;
                self.compile_expr(unit, right)?;
                let opcode = match op {
                    BinOp::Add => Opcode::BinaryAdd,
                    BinOp::Sub => Opcode::BinarySubtract,
                    BinOp::Mul => Opcode::BinaryMultiply,
                    BinOp::Div => Opcode::BinaryDivide,
                    BinOp::Mod => Opcode::BinaryModulo,
                };
                unit.seq.add_op(opcode, 0, *location)
            }
            Expr::Compare {
                op,
                left,
                right,
                location,
            } => {
                self.compile_expr(unit, left)?;
                self.compile_expr(unit, right)?;
                unit.seq
                    .add_op(Opcode::CompareOp, u8::from(*op) as u32, *location)
            }
            Expr::Call {
                func,
                args,
                location,
            } => {
                self.compile_expr(unit, func)?;
                for arg in args.iter() {
                    self.compile_expr(unit, arg)?;
                }
                unit.seq
                    .add_op(Opcode::CallFunction, args.len() as u32, *location)
            }
            Expr::Yield { value, location } => {
                if !unit.metadata.is_function
                    && !self.flags.contains(FeatureFlags::TOP_LEVEL_YIELD)
                {
                    return Err(CompileError::user("'yield' outside function", *location));
                }
                match value {
                    Some(value) => self.compile_expr(unit, value)?,
                    None => self.emit_load_const(unit, Constant::None, *location)?,
                }
                unit.seq.add_op(Opcode::YieldValue, 0, *location)
            }
        }
    }

    fn compile_function(
        &mut self,
        parent: &Unit,
        name: &str,
        params: &[&str],
        body: &[Stmt<'_>],
        location: SrcLocation,
    ) -> Result<Arc<CodeObject>, CompileError> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            self.nesting -= 1;
            return Err(CompileError::user(
                "program too deeply nested",
                location,
            ));
        }

        let mut inner = Unit {
            metadata: CodeUnitMetadata::new(name, location.start_line),
            seq: InstructionSequence::new(),
        };
        inner.metadata.is_function = true;
        inner.metadata.argcount = params.len() as u32;
        let parent_qualname = parent
            .metadata
            .is_function
            .then(|| parent.metadata.qualname().to_owned());
        inner.metadata.qualname_for(parent_qualname.as_deref());
        for param in params {
            inner
                .metadata
                .intern_varname(param)
                .map_err(|e| e.at(location))?;
        }
        collect_assigned(body, &mut inner.metadata)?;

        let result = self
            .compile_body(&mut inner, body)
            .and_then(|()| self.emit_implicit_return(&mut inner))
            .and_then(|()| self.finish_unit(inner));
        self.nesting -= 1;
        Ok(Arc::new(result?))
    }

    /// Trailing `return None`, so control never falls off the end.
    fn emit_implicit_return(&mut self, unit: &mut Unit) -> Result<(), CompileError> {
        self.emit_load_const(unit, Constant::None, NO_LOCATION)?;
        unit.seq.add_op(Opcode::ReturnValue, 0, NO_LOCATION)
    }

    fn emit_load_const(
        &mut self,
        unit: &mut Unit,
        constant: Constant,
        location: SrcLocation,
    ) -> Result<(), CompileError> {
        let idx = unit
            .metadata
            .intern_const(constant)
            .map_err(|e| e.at(location))?;
        unit.seq.add_op(Opcode::LoadConst, idx, location)
    }

    fn load_name(
        &mut self,
        unit: &mut Unit,
        name: &str,
        location: SrcLocation,
    ) -> Result<(), CompileError> {
        if unit.metadata.is_function {
            return match unit.metadata.varname_slot(name) {
                Some(slot) => unit.seq.add_op(Opcode::LoadFast, slot, location),
                None => {
                    let idx = unit
                        .metadata
                        .intern_name(name)
                        .map_err(|e| e.at(location))?;
                    unit.seq.add_op(Opcode::LoadGlobal, idx, location)
                }
            };
        }
        if unit.metadata.is_fast_hidden(name) {
            let slot = unit
                .metadata
                .intern_varname(name)
                .map_err(|e| e.at(location))?;
            return unit.seq.add_op(Opcode::LoadFast, slot, location);
        }
        let idx = unit
            .metadata
            .intern_name(name)
            .map_err(|e| e.at(location))?;
        unit.seq.add_op(Opcode::LoadName, idx, location)
    }

    fn store_name(
        &mut self,
        unit: &mut Unit,
        name: &str,
        location: SrcLocation,
    ) -> Result<(), CompileError> {
        if unit.metadata.is_function {
            let slot = unit
                .metadata
                .intern_varname(name)
                .map_err(|e| e.at(location))?;
            return unit.seq.add_op(Opcode::StoreFast, slot, location);
        }
        if unit.metadata.is_fast_hidden(name) {
            let slot = unit
                .metadata
                .intern_varname(name)
                .map_err(|e| e.at(location))?;
            return unit.seq.add_op(Opcode::StoreFast, slot, location);
        }
        let idx = unit
            .metadata
            .intern_name(name)
            .map_err(|e| e.at(location))?;
        unit.seq.add_op(Opcode::StoreName, idx, location)
    }
}

/// Pre-scan a function body for assigned names so every local has its
/// frame slot before any instruction is emitted.
fn collect_assigned(
    stmts: &[Stmt<'_>],
    metadata: &mut CodeUnitMetadata,
) -> Result<(), CompileError> {
    for stmt in stmts {
        match stmt {
            Stmt::Assign { name, location, .. } => {
                metadata
                    .intern_varname(name)
                    .map_err(|e| e.at(*location))?;
            }
            Stmt::FunctionDef { name, location, .. } => {
                metadata
                    .intern_varname(name)
                    .map_err(|e| e.at(*location))?;
            }
            Stmt::If { body, orelse, .. } => {
                collect_assigned(body, metadata)?;
                collect_assigned(orelse, metadata)?;
            }
            Stmt::While { body, .. } => collect_assigned(body, metadata)?,
            Stmt::Try { body, handler, .. } => {
                collect_assigned(body, metadata)?;
                collect_assigned(handler, metadata)?;
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;
    use bumpalo::collections::Vec as ArenaVec;
    use flint_core::CodeFlags;

    fn loc(line: i32) -> SrcLocation {
        SrcLocation::line(line, 0)
    }

    fn lit(value: Literal<'_>, line: i32) -> Expr<'_> {
        Expr::Literal {
            value,
            location: loc(line),
        }
    }

    fn compile<'a>(arena: &'a Bump, body: Vec<Stmt<'a>>) -> Result<CodeObject, CompileError> {
        compile_at_level(arena, body, 0)
    }

    fn compile_at_level<'a>(
        arena: &'a Bump,
        body: Vec<Stmt<'a>>,
        optimize: u8,
    ) -> Result<CodeObject, CompileError> {
        let mut module = Module::new(arena);
        module.body.extend(body);
        Compiler::new("<test>", optimize, FeatureFlags::empty()).compile_module(&module)
    }

    fn opcodes(code: &CodeObject) -> Vec<u8> {
        (0..code.num_units())
            .map(|i| code.unit_at(i).unwrap().0)
            .collect()
    }

    #[test]
    fn assignment_and_name_lookup() {
        let arena = Bump::new();
        let code = compile(
            &arena,
            vec![
                Stmt::Assign {
                    name: "x",
                    value: lit(Literal::Int(1), 1),
                    location: loc(1),
                },
                Stmt::Expr {
                    value: Expr::Name {
                        name: "x",
                        location: loc(2),
                    },
                },
            ],
        )
        .unwrap();

        assert_eq!(code.names, ["x"]);
        assert_eq!(
            opcodes(&code),
            [
                Opcode::LoadConst.into(),
                Opcode::StoreName.into(),
                Opcode::LoadName.into(),
                Opcode::PopTop.into(),
                Opcode::LoadConst.into(),
                Opcode::ReturnValue.into(),
            ]
        );
        assert_eq!(code.consts, [Constant::Int(1), Constant::None]);
    }

    #[test]
    fn function_params_use_frame_slots() {
        let arena = Bump::new();
        let a = arena.alloc(Expr::Name {
            name: "a",
            location: loc(2),
        });
        let b = arena.alloc(Expr::Name {
            name: "b",
            location: loc(2),
        });
        let sum = Expr::Binary {
            op: BinOp::Add,
            left: a,
            right: b,
            location: loc(2),
        };
        let mut params = ArenaVec::new_in(&arena);
        params.extend(["a", "b"]);
        let mut body = ArenaVec::new_in(&arena);
        body.push(Stmt::Return {
            value: Some(sum),
            location: loc(2),
        });

        let code = compile(
            &arena,
            vec![Stmt::FunctionDef {
                name: "add",
                params,
                body,
                location: loc(1),
            }],
        )
        .unwrap();

        let Some(Constant::Code(inner)) = code.consts.first() else {
            panic!("function code object not in the pool");
        };
        assert_eq!(inner.varnames, ["a", "b"]);
        assert_eq!(inner.argcount, 2);
        assert_eq!(inner.qualname, "add");
        assert!(inner.flags.contains(CodeFlags::OPTIMIZED | CodeFlags::NEWLOCALS));
        assert!(!inner.flags.contains(CodeFlags::NESTED));
        assert_eq!(
            opcodes(inner),
            [
                Opcode::LoadFast.into(),
                Opcode::LoadFast.into(),
                Opcode::BinaryAdd.into(),
                Opcode::ReturnValue.into(),
            ]
        );
        assert_eq!(inner.stacksize, 2);
    }

    #[test]
    fn nested_function_is_flagged_and_qualified() {
        let arena = Bump::new();
        let mut inner_body = ArenaVec::new_in(&arena);
        inner_body.push(Stmt::Pass { location: loc(3) });
        let mut outer_body = ArenaVec::new_in(&arena);
        outer_body.push(Stmt::FunctionDef {
            name: "g",
            params: ArenaVec::new_in(&arena),
            body: inner_body,
            location: loc(2),
        });

        let code = compile(
            &arena,
            vec![Stmt::FunctionDef {
                name: "f",
                params: ArenaVec::new_in(&arena),
                body: outer_body,
                location: loc(1),
            }],
        )
        .unwrap();

        let Some(Constant::Code(outer)) = code.consts.first() else {
            panic!("outer code object not in the pool");
        };
        let Some(Constant::Code(inner)) = outer.consts.first() else {
            panic!("inner code object not in the pool");
        };
        assert_eq!(inner.qualname, "f.g");
        assert!(inner.flags.contains(CodeFlags::NESTED));
        // The inner function's name is a local of the outer function.
        assert_eq!(outer.varnames, ["g"]);
    }

    #[test]
    fn constant_test_folds_away_at_level_one() {
        let arena = Bump::new();
        let mut body = ArenaVec::new_in(&arena);
        body.push(Stmt::Assign {
            name: "x",
            value: lit(Literal::Int(1), 2),
            location: loc(2),
        });
        let mut orelse = ArenaVec::new_in(&arena);
        orelse.push(Stmt::Assign {
            name: "x",
            value: lit(Literal::Int(2), 4),
            location: loc(4),
        });

        let code = compile_at_level(
            &arena,
            vec![Stmt::If {
                test: lit(Literal::Bool(true), 1),
                body,
                orelse,
                location: loc(1),
            }],
            1,
        )
        .unwrap();

        // No branch survives; only the taken arm's store remains.
        let ops = opcodes(&code);
        assert!(!ops.contains(&Opcode::PopJumpIfFalse.into()));
        assert!(!ops.contains(&Opcode::Jump.into()));
        // The constant pool is untouched by optimization: both the test
        // constant and the dead arm's constant keep their slots.
        assert!(code.consts.contains(&Constant::Bool(true)));
        assert!(code.consts.contains(&Constant::Int(2)));
    }

    #[test]
    fn while_loop_shape() {
        let arena = Bump::new();
        let mut body = ArenaVec::new_in(&arena);
        body.push(Stmt::Pass { location: loc(2) });
        let code = compile(
            &arena,
            vec![Stmt::While {
                test: Expr::Name {
                    name: "go",
                    location: loc(1),
                },
                body,
                location: loc(1),
            }],
        )
        .unwrap();

        let ops = opcodes(&code);
        assert!(ops.contains(&Opcode::PopJumpIfFalse.into()));
        assert!(ops.contains(&Opcode::Jump.into()));
        // The backward jump targets the loop head at unit 0.
        let jump_unit = (0..code.num_units())
            .find(|&i| code.unit_at(i).unwrap().0 == u8::from(Opcode::Jump))
            .unwrap();
        assert_eq!(code.unit_at(jump_unit).unwrap().1, 0);
    }

    #[test]
    fn try_produces_an_exception_table() {
        let arena = Bump::new();
        let f = arena.alloc(Expr::Name {
            name: "f",
            location: loc(2),
        });
        let mut body = ArenaVec::new_in(&arena);
        body.push(Stmt::Assign {
            name: "x",
            value: Expr::Call {
                func: f,
                args: ArenaVec::new_in(&arena),
                location: loc(2),
            },
            location: loc(2),
        });
        let mut handler = ArenaVec::new_in(&arena);
        handler.push(Stmt::Pass { location: loc(4) });

        let code = compile(
            &arena,
            vec![Stmt::Try {
                body,
                handler,
                location: loc(1),
            }],
        )
        .unwrap();

        assert_eq!(code.exception_table.len(), 1);
        let row = code.exception_table[0];
        assert_eq!(row.depth, 0);
        assert!(!row.preserve_lasti);
        // The handler lies beyond the protected range.
        assert!(row.target > row.end);
    }

    #[test]
    fn return_outside_function_is_a_user_error() {
        let arena = Bump::new();
        let err = compile(
            &arena,
            vec![Stmt::Return {
                value: None,
                location: loc(1),
            }],
        )
        .unwrap_err();
        assert!(!err.is_internal());
        assert_eq!(err.location(), Some(loc(1)));
    }

    #[test]
    fn module_yield_requires_the_feature_flag() {
        let arena = Bump::new();
        let body = vec![Stmt::Expr {
            value: Expr::Yield {
                value: None,
                location: loc(1),
            },
        }];

        let err = compile(&arena, body.clone()).unwrap_err();
        assert!(!err.is_internal());

        let mut module = Module::new(&arena);
        module.body.extend(body);
        let code = Compiler::new("<test>", 0, FeatureFlags::TOP_LEVEL_YIELD)
            .compile_module(&module)
            .unwrap();
        assert!(code.flags.contains(CodeFlags::GENERATOR));
    }

    #[test]
    fn docstring_is_dropped_when_asked() {
        let arena = Bump::new();
        let body = vec![Stmt::Expr {
            value: lit(Literal::Str("module doc"), 1),
        }];

        let mut module = Module::new(&arena);
        module.body.extend(body);
        let code = Compiler::new("<test>", 0, FeatureFlags::NO_DOCSTRINGS)
            .compile_module(&module)
            .unwrap();
        assert_eq!(code.consts, [Constant::None]);
    }

    #[test]
    fn nesting_limit_is_a_user_error() {
        let arena = Bump::new();
        let mut body = ArenaVec::new_in(&arena);
        body.push(Stmt::Pass {
            location: loc(MAX_NESTING as i32 + 1),
        });
        for depth in (1..=MAX_NESTING as i32 + 1).rev() {
            let mut outer = ArenaVec::new_in(&arena);
            outer.push(Stmt::FunctionDef {
                name: "f",
                params: ArenaVec::new_in(&arena),
                body,
                location: loc(depth),
            });
            body = outer;
        }

        let mut module = Module::new(&arena);
        module.body.extend(body);
        let err = Compiler::new("<test>", 0, FeatureFlags::empty())
            .compile_module(&module)
            .unwrap_err();
        assert!(!err.is_internal());
    }

    #[test]
    fn unknown_name_in_function_loads_global() {
        let arena = Bump::new();
        let mut body = ArenaVec::new_in(&arena);
        body.push(Stmt::Return {
            value: Some(Expr::Name {
                name: "limit",
                location: loc(2),
            }),
            location: loc(2),
        });

        let code = compile(
            &arena,
            vec![Stmt::FunctionDef {
                name: "f",
                params: ArenaVec::new_in(&arena),
                body,
                location: loc(1),
            }],
        )
        .unwrap();

        let Some(Constant::Code(inner)) = code.consts.first() else {
            panic!("function code object not in the pool");
        };
        assert_eq!(inner.names, ["limit"]);
        assert_eq!(opcodes(inner)[0], Opcode::LoadGlobal.into());
    }

    #[test]
    fn fast_hidden_override_switches_module_addressing() {
        let mut compiler = Compiler::new("<test>", 0, FeatureFlags::empty());
        let mut unit = Unit {
            metadata: CodeUnitMetadata::new("<module>", 1),
            seq: InstructionSequence::new(),
        };
        compiler.store_name(&mut unit, "tmp", loc(1)).unwrap();
        unit.metadata.set_fast_hidden("tmp", true);
        compiler.store_name(&mut unit, "tmp", loc(2)).unwrap();
        compiler.load_name(&mut unit, "tmp", loc(3)).unwrap();
        unit.metadata.set_fast_hidden("tmp", false);
        compiler.store_name(&mut unit, "tmp", loc(4)).unwrap();

        let ops: Vec<Opcode> = unit.seq.instructions().iter().map(|i| i.opcode).collect();
        assert_eq!(
            ops,
            [
                Opcode::StoreName,
                Opcode::StoreFast,
                Opcode::LoadFast,
                Opcode::StoreName,
            ]
        );
    }
}
