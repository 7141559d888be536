//! PEP 440 versions and version specifiers
//!
//! See <https://peps.python.org/pep-0440/>.

mod specifier;
mod version;

pub use specifier::{Operator, SpecifierParseError, VersionSpecifier, VersionSpecifiers};
pub use version::{LocalSegment, PreKind, PreRelease, Version, VersionParseError};
