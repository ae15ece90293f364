//! Unified logging support for dynmap
//!
//! These macros forward to the `log` crate when the `log` feature is on. With
//! the feature off the arguments are still type-checked so values that only
//! appear in log lines do not trip unused warnings.

/// Swallows formatted arguments when logging is compiled out
#[doc(hidden)]
#[inline]
pub fn discard(_args: core::fmt::Arguments<'_>) {}

/// Unified trace-level logging
#[macro_export]
macro_rules! mm_trace {
    ($($arg:tt)*) => {{
        #[cfg(feature = "log")]
        log::trace!($($arg)*);
        #[cfg(not(feature = "log"))]
        $crate::logging::discard(format_args!($($arg)*));
    }};
}

/// Unified debug-level logging
#[macro_export]
macro_rules! mm_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "log")]
        log::debug!($($arg)*);
        #[cfg(not(feature = "log"))]
        $crate::logging::discard(format_args!($($arg)*));
    }};
}

/// Unified info-level logging
#[macro_export]
macro_rules! mm_info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "log")]
        log::info!($($arg)*);
        #[cfg(not(feature = "log"))]
        $crate::logging::discard(format_args!($($arg)*));
    }};
}

/// Unified warn-level logging
#[macro_export]
macro_rules! mm_warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "log")]
        log::warn!($($arg)*);
        #[cfg(not(feature = "log"))]
        $crate::logging::discard(format_args!($($arg)*));
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_macros_accept_arguments() {
        let offset = 0x3000usize;
        let name = "dynmapdev";
        mm_trace!("{}: trace at {:#x}", name, offset);
        mm_debug!("{}: debug at {:#x}", name, offset);
        mm_info!("{}: info", name);
        mm_warn!("plain warning");
    }
}
