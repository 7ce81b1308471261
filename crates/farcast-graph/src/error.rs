//! Graph errors. Both variants are fatal for the whole build.

use farcast_core::SpecRef;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    /// Every distinct cycle found, so multiple independent cycles can be
    /// fixed in one pass. Chains are unit-name paths ending where they
    /// started, e.g. `d -> e -> d`.
    #[error("{}", cycle_summary(chains))]
    Cycles { chains: Vec<Vec<String>> },

    /// An explicitly declared dependency that does not name any known spec.
    #[error("spec {spec} declares unknown dependency {dep:?}")]
    UnknownDependency { spec: SpecRef, dep: String },
}

fn cycle_summary(chains: &[Vec<String>]) -> String {
    let mut out = format!("{} dependency cycle(s) detected:", chains.len());
    for chain in chains {
        out.push_str("\n  ");
        out.push_str(&chain.join(" -> "));
    }
    out
}
