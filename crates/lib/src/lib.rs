//! revi-lib: Core of the revi toolchain bootstrapper
//!
//! revi fetches compilers, build tools and a minimal userland as source or
//! binary artifacts and builds them into a content-addressed store:
//! - `Package`: a node of the dependency graph, addressed by a hash of all
//!   of its build inputs
//! - `Fetcher`: resolves a URL into a package graph from `.deps` manifests
//!   or the built-in bootstrap table
//! - `Unpacker`: extracts every package into `<chroot>/re/vi/<hash>/`
//! - `Builder`: builds the graph bottom-up through hooks, Lua recipes or the
//!   built-in adapter table, inside a sandbox

pub mod build;
pub mod config;
pub mod consts;
pub mod fetch;
pub mod lua;
pub mod pattern;
pub mod pkg;
pub mod unpack;
pub mod util;
