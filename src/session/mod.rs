//! Export session: lifecycle, options and the public `BeginEncoding`/`AddFrame`/`EndEncoding`
//! surface.

/// Session lifecycle manager.
pub mod export_session;
/// Session options and per-export parameters.
pub mod opts;
