// ============================================================================
// Numeric Module
// Integer base units for sizes and prices
// ============================================================================
//
// This module provides:
// - BaseQuantums: order/position size in base-asset quantums
// - Subticks: order price in the clob pair's smallest increment
// - quote_quantums/apply_ppm: conversions shared by settlement and margin code
// - decimal: bridge into rust_decimal for oracle-priced margin math
//
// Design principles:
// - No floating-point operations
// - All fallible arithmetic returns Result (no panics)

pub mod decimal;
mod errors;
mod quantums;

pub use errors::{NumericError, NumericResult};
pub use quantums::{apply_ppm, quote_quantums, BaseQuantums, Subticks, ONE_MILLION};
