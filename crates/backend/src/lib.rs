//! GitSniff - probe a hosting platform for commits left behind by hidden or deleted forks.
//!
//! Every short hash of a given width is probed as `<repo>/commit/<hash>`.
//! Pages that exist are classified against the repository's canonical commit
//! list: a match is a mainline commit, anything else is a fork commit.

mod domain;
pub use domain::{config, hash_space};

pub mod output;
pub mod probe;
pub mod scan;

mod scanner;
pub use scanner::{Scanner, install_signal_handlers};
