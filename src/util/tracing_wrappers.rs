// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

#[cfg(feature = "tracing")]
#[allow(unused_imports)]
pub use tracing::{debug, error, info, trace, warn};

// Without the `tracing` feature the logging macros swallow their arguments.
// They get distinct names and are re-exported under the `tracing` ones, since
// a `macro_rules! warn` is ambiguous with the built-in `#[warn]` attribute.
#[cfg(not(feature = "tracing"))]
macro_rules! __noop_debug {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "tracing"))]
macro_rules! __noop_error {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "tracing"))]
macro_rules! __noop_info {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "tracing"))]
macro_rules! __noop_trace {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "tracing"))]
macro_rules! __noop_warn {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
#[allow(unused_imports)]
pub(crate) use {
    __noop_debug as debug, __noop_error as error, __noop_info as info, __noop_trace as trace,
    __noop_warn as warn,
};
