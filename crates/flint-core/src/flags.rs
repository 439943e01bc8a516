//! Code object flags and compilation feature flags.

use bitflags::bitflags;

bitflags! {
    /// Flags stamped on a finished code object.
    ///
    /// These describe properties of the compiled unit that the interpreter
    /// inspects before executing it: how its frame is laid out, whether it
    /// accepts variable arguments, and whether it is a generator.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CodeFlags: u32 {
        /// Locals are addressed by frame slot; no name-based fallback.
        const OPTIMIZED = 1 << 0;
        /// The frame gets a fresh locals mapping on every call.
        const NEWLOCALS = 1 << 1;
        /// The unit accepts a variable positional argument tail.
        const VARARGS = 1 << 2;
        /// The unit accepts arbitrary keyword arguments.
        const VARKEYWORDS = 1 << 3;
        /// The unit is lexically nested inside another unit.
        const NESTED = 1 << 4;
        /// The unit contains generator-style control flow.
        const GENERATOR = 1 << 5;
    }
}

bitflags! {
    /// Caller-supplied flags selecting language-construct semantics.
    ///
    /// Passed through from the frontend alongside the parsed tree; the
    /// backend only reads them, it never derives new ones.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FeatureFlags: u32 {
        /// Allow `yield` outside function scope (interactive units).
        const TOP_LEVEL_YIELD = 1 << 0;
        /// Treat bare string statements as code, not documentation.
        const NO_DOCSTRINGS = 1 << 1;
    }
}
