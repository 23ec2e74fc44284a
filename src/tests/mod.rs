//! tests/mod.rs
//! Pruebas del servicio. Ejecutar con `cargo test`.

pub mod support;

mod provider_tests;
