/// These errors are for internal IR failures, not designed to be useful to the end user of an
/// analysis, but more for users of the `pta-ir` crate, i.e., front end and analysis developers.

#[derive(Debug)]
pub enum IrError {
    DuplicateFunction(String),
    DuplicateValue(String, String),
    MisplacedTerminator(String),
    MissingBlock(String),
    MissingTerminator(String),
    ParseFailure(String, String),
    UndefinedValue(String, String),

    VerifyBranchToMissingBlock(String),
    VerifyCallArgCountMismatch(String, usize, usize),
    VerifyCallToMissingFunction(String),
    VerifyEntryBlockHasPredecessors(String, Vec<String>),
    VerifyPhiFromNonPredecessor(String, String),
    VerifyPhiNotAtBlockStart(String),
}

impl std::error::Error for IrError {}

use std::fmt;

use itertools::Itertools;

impl fmt::Display for IrError {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            IrError::DuplicateFunction(fn_str) => {
                write!(f, "Function {fn_str} is defined more than once.")
            }
            IrError::DuplicateValue(fn_str, val_str) => {
                write!(
                    f,
                    "Value {val_str} is defined more than once in function {fn_str}."
                )
            }
            IrError::MisplacedTerminator(blk_str) => {
                write!(f, "Block {blk_str} has a misplaced terminator.")
            }
            IrError::MissingBlock(blk_str) => write!(f, "Unable to find block {blk_str}."),
            IrError::MissingTerminator(blk_str) => {
                write!(f, "Block {blk_str} is missing its terminator.")
            }
            IrError::ParseFailure(expecting, found) => {
                write!(
                    f,
                    "Parse failure: expecting '{expecting}', found '{found}'"
                )
            }
            IrError::UndefinedValue(fn_str, val_str) => {
                write!(
                    f,
                    "Value {val_str} is used in function {fn_str} but never defined."
                )
            }

            // Verification failures:
            IrError::VerifyBranchToMissingBlock(label) => {
                write!(
                    f,
                    "Verification failed: \
                    Branch to block '{label}' is not a block in the current function."
                )
            }
            IrError::VerifyCallArgCountMismatch(callee, expected, found) => {
                write!(
                    f,
                    "Verification failed: Call to {callee} passes {found} arguments \
                    but it expects {expected}."
                )
            }
            IrError::VerifyCallToMissingFunction(callee) => {
                write!(
                    f,
                    "Verification failed: Call to function {callee} which is not in the module."
                )
            }
            IrError::VerifyEntryBlockHasPredecessors(function_name, predecessors) => {
                let plural_s = if predecessors.len() == 1 { "" } else { "s" };
                write!(
                    f,
                    "Verification failed: Entry block of the function \"{function_name}\" has {}predecessor{}. \
                     The predecessor{} {} {}.",
                    if predecessors.len() == 1 {
                        "a "
                    } else {
                        ""
                    },
                    plural_s,
                    plural_s,
                    if predecessors.len() == 1 {
                        "is"
                    } else {
                        "are"
                    },
                    predecessors.iter().map(|block_label| format!("\"{block_label}\"")).collect_vec().join(", ")
                )
            }
            IrError::VerifyPhiFromNonPredecessor(phi_block, from_block) => {
                write!(
                    f,
                    "Verification failed: Phi in block {phi_block} has an incoming value from \
                    {from_block} which is not a predecessor."
                )
            }
            IrError::VerifyPhiNotAtBlockStart(blk_str) => {
                write!(
                    f,
                    "Verification failed: Phi instructions in block {blk_str} must come before \
                    all other instructions."
                )
            }
        }
    }
}
