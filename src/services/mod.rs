//! services/mod.rs
//! Módulo que agrupa los servicios: almacenamiento, proveedor y despacho.

pub mod dispatch_scheduler;
pub mod dispatch_workflow;
pub mod outreach_service;
pub mod provider_client;
