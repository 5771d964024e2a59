//! Service templates that run tfchain infrastructure on a Zero-OS node.
//!
//! Each template is a small state machine (see [`state`]) over the capabilities of the node it runs on (see
//! [`sal`]). Templates are created and owned by a [`robot::Robot`], through which they find the services they
//! depend on.

pub mod cfg;
pub mod error;
pub mod host;
pub mod recurring;
pub mod render;
pub mod retry;
pub mod robot;
pub mod rpc;
pub mod sal;
pub mod services;
pub mod state;
pub mod template;
pub mod uid;
pub mod wallet;
