//! Registro por defecto: el catálogo con todos los módulos de este crate.

use seq_core::InMemoryCatalog;

use crate::modules;

/// Construye el catálogo estándar (`math` + `strings`).
pub fn build_default_catalog() -> InMemoryCatalog {
    let mut catalog = InMemoryCatalog::new();
    modules::math::register(&mut catalog);
    modules::strings::register(&mut catalog);
    catalog
}
