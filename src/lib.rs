//! Pylon - HTTP/1.x front end with a pooled database backend
//!
//! Core library for request parsing, dispatch and connection pooling.

pub mod config;
pub mod controller;
pub mod db;
pub mod http;
pub mod server;
