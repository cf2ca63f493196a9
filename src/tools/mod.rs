//! Tool sets for the agent
//!
//! Three resolver implementations, tried in a fixed order by the
//! executor chain:
//!
//! 1. [`NamespacedToolSet`] - externally registered tools (`mcp_` prefix)
//! 2. [`BuiltinToolSet`] - always-available built-ins
//! 3. [`UserToolSet`] - user-defined callables
//!
//! First resolver that recognizes a name handles it.

mod builtin;
mod external;
mod user;

pub use builtin::{BuiltinToolSet, CALCULATOR, CURRENT_TIME, TEXT_STATS};
pub use external::{ExternalTool, NamespacedToolSet, EXTERNAL_PREFIX};
pub use user::UserToolSet;
