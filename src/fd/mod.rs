/*!
 * Descriptor Module
 * Fixed-capacity descriptor table and its tagged slot type
 */

pub mod table;

pub use table::{FdEntry, FdTable};
