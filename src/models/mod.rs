//! models/mod.rs
//! Módulo raíz para modelos/estructuras compartidas.

pub mod intake_model;
pub mod outreach_model;
