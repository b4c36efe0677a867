//! mediacat - media catalog server
//!
//! This library crate exposes the catalog backends, the browse engine, the
//! range transfer server and the gateway for the binary and for integration
//! testing.

pub mod browse;
pub mod catalog;
pub mod config;
pub mod didl;
pub mod gateway;
pub mod service;
pub mod transfer;
