//! Call-site arguments vs. a function signature.
//!
//! Two comparison modes, chosen by how the code passed its arguments:
//! - named: set difference of names, optional signature arguments never missing;
//! - positional: arity only, the code's `$1..$n` never compared by name.

use std::collections::BTreeSet;

use schemaguard_core::types::code::{is_positional_name, positional_name};
use schemaguard_core::types::schema::FunctionSignature;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    Named,
    Positional(usize),
}

impl CallMode {
    /// Positional when every supplied name was synthesized as `$k`.
    pub fn of(code_args: &[String]) -> Self {
        if !code_args.is_empty() && code_args.iter().all(|a| is_positional_name(a)) {
            CallMode::Positional(code_args.len())
        } else {
            CallMode::Named
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentDiff {
    /// Required signature arguments the code does not supply.
    pub missing: Vec<String>,
    /// Arguments the code supplies that the signature does not declare.
    pub extra: Vec<String>,
}

impl ArgumentDiff {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }
}

pub fn compare_arguments(code_args: &[String], signature: &FunctionSignature) -> ArgumentDiff {
    match CallMode::of(code_args) {
        CallMode::Named => {
            let supplied: BTreeSet<&str> = code_args.iter().map(String::as_str).collect();
            let declared: BTreeSet<&str> =
                signature.arguments.iter().map(|a| a.name.as_str()).collect();
            ArgumentDiff {
                missing: signature
                    .required_arguments()
                    .filter(|a| !supplied.contains(a.name.as_str()))
                    .map(|a| a.name.clone())
                    .collect(),
                extra: supplied
                    .difference(&declared)
                    .map(|s| s.to_string())
                    .collect(),
            }
        }
        CallMode::Positional(n) => {
            let total = signature.arguments.len();
            ArgumentDiff {
                missing: signature
                    .arguments
                    .iter()
                    .skip(n)
                    .filter(|a| !a.optional)
                    .map(|a| a.name.clone())
                    .collect(),
                extra: (total + 1..=n).map(positional_name).collect(),
            }
        }
    }
}
