// Security module for path validation and access control
//
// Storage and vault tools accept caller-supplied paths; this module keeps
// every one of them inside its configured root directory.

pub mod path_validator;

pub use path_validator::{
    PathSecurityError, display_relative, is_confined, resolve_existing, resolve_in_root,
};
