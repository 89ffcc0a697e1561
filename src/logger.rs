//! Leveled console output for the ground station. Every line carries a
//! three-letter level tag and a UTC timestamp with millisecond resolution,
//! so interleaved monitor and decision-cycle output stays attributable.

/// Shared line writer behind the leveled macros. Not meant for direct use.
#[macro_export]
macro_rules! console_line {
    ($color:literal, $tag:literal, $($arg:tt)*) => {
        println!(
            concat!("\x1b[", $color, "m", $tag, " {}\x1b[0m | {}"),
            chrono::Utc::now().format("%d %H:%M:%S%.3f"),
            format_args!($($arg)*)
        )
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => { $crate::console_line!("0;92", "INF", $($arg)*) };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => { $crate::console_line!("0;93", "WRN", $($arg)*) };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => { $crate::console_line!("0;91", "ERR", $($arg)*) };
}

/// Aborts the process: reserved for broken wiring during startup.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {
        panic!(
            "\x1b[1;91mFTL {}\x1b[0m | {}",
            chrono::Utc::now().format("%d %H:%M:%S%.3f"),
            format_args!($($arg)*)
        )
    };
}

/// Per-poll and per-cycle trace chatter, silenced unless `KESTREL_TRACE`
/// is set in the environment.
#[macro_export]
macro_rules! event {
    ($($arg:tt)*) => {
        if std::env::var("KESTREL_TRACE").is_ok() {
            $crate::console_line!("0;96", "TRC", $($arg)*)
        }
    };
}
