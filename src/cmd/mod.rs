//! CLI command implementations.
//!
//! | Module     | Commands handled |
//! |------------|------------------|
//! | `run`      | `Run`            |
//! | `validate` | `Validate`       |

pub mod run;
pub mod validate;

pub use run::cmd_run;
pub use validate::cmd_validate;
