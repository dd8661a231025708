use snafu::Snafu;

/// The public Error type for this library.
#[derive(Debug, Snafu)]
pub struct Error(LibError);

/// The public Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

/// The internal Result type for this library.
pub(crate) type LibResult<T> = std::result::Result<T, LibError>;

/// Clamp a script line number to the reportable range.
///
/// Anything outside `1..i64::MAX` is reported as `-1`, meaning the line is
/// unknown (for example, an error raised outside the script phase).
pub(crate) fn src_line(line: i64) -> i64 {
    if line < 1 {
        -1
    } else {
        line
    }
}

/// The internal Error type for this library.
///
/// All compilation failures are fatal; there is no partial-success path.
/// Variants that can be triggered from a script carry the 1-based script
/// line, with `-1` meaning the line is unknown.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum LibError {
    #[snafu(display("Integer overflow on script line {}", line))]
    Overflow { line: i64 },

    #[snafu(display("{} on script line {}", what, line))]
    Range { what: String, line: i64 },

    #[snafu(display("Interpreter stack underflow on script line {}", line))]
    StackUnderflow { line: i64 },

    #[snafu(display("Interpreter stack overflow on script line {}", line))]
    StackOverflow { line: i64 },

    #[snafu(display("{} on script line {}", what, line))]
    GroupConstraint { what: String, line: i64 },

    #[snafu(display("Expecting {} on stack on script line {}", expected, line))]
    TypeMismatch { expected: &'static str, line: i64 },

    #[snafu(display("Var/const '{}' not defined on script line {}", name, line))]
    Undefined { name: String, line: i64 },

    #[snafu(display("Redefinition of '{}' on script line {}", name, line))]
    Redefinition { name: String, line: i64 },

    #[snafu(display("Can't assign to const '{}' on script line {}", name, line))]
    ConstAssign { name: String, line: i64 },

    #[snafu(display("Ramp may not be last region in graph on script line {}", line))]
    RampAtEnd { line: i64 },

    #[snafu(display("Empty graphs are not allowed on script line {}", line))]
    EmptyGraph { line: i64 },

    #[snafu(display("{} on script line {}", what, line))]
    NonChronological { what: String, line: i64 },

    #[snafu(display("Duplicate operation name registration: {}", name))]
    DuplicateOp { name: String },

    #[snafu(display("Invalid name '{}' on script line {}", name, line))]
    InvalidName { name: String, line: i64 },

    #[snafu(display("{}: I/O error: {}", site, source))]
    Io {
        site: String,
        source: std::io::Error,
    },

    #[snafu(display("{} module is shut down", module))]
    Shutdown { module: &'static str },

    #[snafu(display("{} on script line {}", what, line))]
    Syntax { what: String, line: i64 },

    #[snafu(display("Stopped on script line {}", line))]
    Stopped { line: i64 },

    #[snafu(display("{}: internal error", site))]
    Internal { site: String },
}

macro_rules! site {
    () => {
        format!("{}:{}", file!(), line!())
    };
}

macro_rules! io {
    () => {
        crate::error::IoSnafu { site: site!() }
    };
}

/// Build an internal-invariant error at the current source location.
macro_rules! internal {
    () => {
        crate::error::LibError::Internal { site: site!() }
    };
}

/// Build a `Range` error with a formatted description.
macro_rules! range_err {
    ($line:expr, $fmt:expr) => {
        crate::error::LibError::Range {
            what: String::from($fmt),
            line: crate::error::src_line($line),
        }
    };
    ($line:expr, $fmt:expr, $($arg:expr),+) => {
        crate::error::LibError::Range {
            what: format!($fmt, $($arg),+),
            line: crate::error::src_line($line),
        }
    };
}

#[test]
fn site_test() {
    let line = line!() + 1;
    let site = site!();
    assert!(site.contains("error.rs"));
    assert!(site.contains(format!("{}", line).as_str()));
}

#[test]
fn src_line_test() {
    assert_eq!(src_line(5), 5);
    assert_eq!(src_line(0), -1);
    assert_eq!(src_line(-20), -1);
}

#[test]
fn range_err_display_test() {
    let e = range_err!(12, "Velocity {} out of range", 300);
    let msg = format!("{}", e);
    assert!(msg.contains("Velocity 300 out of range"));
    assert!(msg.contains("12"));
}

#[test]
fn unknown_line_display_test() {
    let e = LibError::Overflow { line: src_line(-1) };
    assert!(format!("{}", e).contains("line -1"));
}
