//! # casebook-core
//!
//! Value model for the casebook formula engine.
//!
//! This crate provides the fundamental types shared by the engine and its callers:
//! - [`Value`] - A raw formula operand (number, string, boolean, date, empty, error marker)
//! - [`ErrorValue`] - An error marker carried through evaluation as a value
//! - [`date`] - Date recognition and the millisecond representation used for date arithmetic
//!
//! ## Example
//!
//! ```rust
//! use casebook_core::Value;
//!
//! let v = Value::from("  42 ");
//! assert_eq!(v.to_number(), 42.0);
//! assert!(Value::from("").is_empty());
//! assert_eq!(Value::from(3.0).to_string(), "3");
//! ```

pub mod date;
mod value;

pub use value::{parse_number, ErrorValue, Value};
