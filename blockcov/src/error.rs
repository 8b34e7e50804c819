//! Errors related to the `blockcov` crate.
//!
//! Please see documentation of the [`error-chain` crate](https://docs.rs/error-chain/0.12.0/error_chain/) for detailed
//! usage.
//!
//! Graph-consistency errors (everything except `Io`, `Json`, `Toml`, `Syntax`, `SaveFailed` and `BadSnapshot`) indicate an
//! internal defect or malformed input. They are fatal to the method being instrumented, but never to its siblings.

use insn::Label;

use std::io;

error_chain! {
    foreign_links {
        Io(io::Error) /** Wrapper of standard I/O error. */;
        Json(::serde_json::Error) #[cfg(feature="serde_json")] /** Wrapper of JSON error. */;
        Toml(::toml::de::Error) #[cfg(feature="toml")] /** Wrapper of TOML deserialization error. */;
    }

    errors {
        /// The method body contains no real instruction.
        EmptyMethod {
            description("method has no instructions")
        }

        /// A branch refers to a label which is not placed in the instruction list, or which is not followed by any
        /// real instruction.
        UnplacedLabel(label: Label) {
            description("branch to unplaced label")
            display("label {:?} is not followed by any instruction", label)
        }

        /// A label is placed at more than one position, so branches to it are ambiguous.
        DuplicateLabel(label: Label) {
            description("label placed twice")
            display("label {:?} is placed more than once", label)
        }

        /// A conditional branch is the last instruction of the method, so it has no fall-through side.
        MissingFallThrough(offset: u32) {
            description("conditional branch without fall-through")
            display("conditional branch at offset {} is not followed by any instruction", offset)
        }

        /// A basic block still has no start offset after resolution.
        UnresolvedBlock {
            description("basic block without start offset")
        }

        /// Two basic blocks start at the same offset.
        DuplicateBlockStart(offset: u32) {
            description("duplicated block start")
            display("two basic blocks start at offset {}", offset)
        }

        /// A basic block would receive a second exit.
        DoubleExit(offset: u32) {
            description("block with two exits")
            display("basic block starting at offset {} contains more than one exit", offset)
        }

        /// An exit does not terminate the block it is folded into.
        MisplacedExit(exit_end: u32, block_end: u32) {
            description("exit does not end its block")
            display("exit ending at offset {} is inside a block ending at offset {}", exit_end, block_end)
        }

        /// The number of exits folded into blocks differs from the number discovered.
        UnmatchedExits(expected: usize, consumed: usize) {
            description("exits mismatch")
            display("exits mismatch, discovered {} exits but only {} were folded into blocks", expected, consumed)
        }

        /// The last basic block has no exit, so execution would run past the end of the body.
        FallsOffEnd(offset: u32) {
            description("control falls off the end of the method")
            display("basic block starting at offset {} falls off the end of the method", offset)
        }

        /// A branch site must be retargeted to an entry which received no label.
        MissingEntryLabel(offset: u32) {
            description("branch target entry has no label")
            display("branch at offset {} targets an entry without a label", offset)
        }

        /// A line of a method source text is malformed.
        Syntax(line: usize, message: String) {
            description("syntax error")
            display("syntax error on line {}: {}", line, message)
        }

        /// Every attempt to persist a snapshot failed.
        SaveFailed(attempts: u32) {
            description("cannot persist coverage results")
            display("cannot persist coverage results after {} attempts", attempts)
        }

        /// A persisted snapshot cannot be decoded.
        BadSnapshot(reason: &'static str) {
            description("malformed snapshot")
            display("malformed snapshot: {}", reason)
        }
    }
}
