/// Aborts on a broken runtime invariant.
///
/// Every call site carries a fixed 8-hex identifier so a crash report can be
/// traced to the exact invariant without symbols or line numbers. These
/// panics are never caught; reaching one means the runtime itself is wrong,
/// not its caller.
#[macro_export]
macro_rules! bug {
    ($id:literal) => {
        panic!(concat!("bug ", $id, ": runtime invariant violated"))
    };
    ($id:literal, $($arg:tt)+) => {
        panic!("bug {}: {}", $id, ::core::format_args!($($arg)+))
    };
}
