//! Corellium Terraform Provider
//!
//! Implements a Terraform provider for the Corellium virtual device platform
//! using the Terraform Plugin Protocol v6.

pub mod context;
pub mod data_sources;
pub mod diagnostics;
pub mod plan;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod server;
pub mod state;

mod generated {
    #![allow(clippy::all)]
    pub mod tfplugin6 {
        include!("generated/tfplugin6.rs");
    }
}

pub use generated::tfplugin6;
