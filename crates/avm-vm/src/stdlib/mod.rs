//! Builtin native libraries.
//!
//! | module   | functions                                    |
//! |----------|----------------------------------------------|
//! | `std`    | self, spawn, yield, exit, error, try, kill   |
//! | `string` | len, concat, eq                              |
//! | `tuple`  | new, get, set, len                           |
//! | `array`  | new, push, get, set, len                     |
//! | `table`  | new, get, set, len                           |

mod collections;
mod process;

use crate::native::NativeRegistry;

pub fn register(registry: &mut NativeRegistry) {
    process::register(registry);
    collections::register(registry);
}
