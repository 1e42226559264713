/// Error numbers carried in the outbound header's `error` field.
///
/// A reply's `error` is either 0 or the negation of one of these. Values
/// match Linux so a daemon can pass `libc` constants straight through.
#[allow(non_camel_case_types)]
pub type errno_t = i32;

pub mod Errno {
    use super::errno_t;

    pub const EPERM: errno_t = 1;
    pub const ENOENT: errno_t = 2;
    pub const EINTR: errno_t = 4;
    pub const EIO: errno_t = 5;
    pub const EAGAIN: errno_t = 11;
    pub const ENOMEM: errno_t = 12;
    pub const EACCES: errno_t = 13;
    pub const EBUSY: errno_t = 16;
    pub const EEXIST: errno_t = 17;
    pub const ENODEV: errno_t = 19;
    pub const ENOTDIR: errno_t = 20;
    pub const EISDIR: errno_t = 21;
    pub const EINVAL: errno_t = 22;
    pub const ENOSPC: errno_t = 28;
    pub const ERANGE: errno_t = 34;
    pub const ENAMETOOLONG: errno_t = 36;
    pub const ENOSYS: errno_t = 38;
    pub const ENOTEMPTY: errno_t = 39;
    pub const EPROTO: errno_t = 71;
    pub const EOVERFLOW: errno_t = 75;
    pub const ENOTCONN: errno_t = 107;
}

/// Largest magnitude a peer may report; anything at or beyond is malformed.
pub const ERRNO_LIMIT: errno_t = 1000;

/// Symbolic name for an error number (sign ignored).
pub fn to_string(code: errno_t) -> &'static str {
    match code.checked_abs().unwrap_or(-1) {
        0 => "OK",
        Errno::EPERM => "EPERM",
        Errno::ENOENT => "ENOENT",
        Errno::EINTR => "EINTR",
        Errno::EIO => "EIO",
        Errno::EAGAIN => "EAGAIN",
        Errno::ENOMEM => "ENOMEM",
        Errno::EACCES => "EACCES",
        Errno::EBUSY => "EBUSY",
        Errno::EEXIST => "EEXIST",
        Errno::ENODEV => "ENODEV",
        Errno::ENOTDIR => "ENOTDIR",
        Errno::EISDIR => "EISDIR",
        Errno::EINVAL => "EINVAL",
        Errno::ENOSPC => "ENOSPC",
        Errno::ERANGE => "ERANGE",
        Errno::ENAMETOOLONG => "ENAMETOOLONG",
        Errno::ENOSYS => "ENOSYS",
        Errno::ENOTEMPTY => "ENOTEMPTY",
        Errno::EPROTO => "EPROTO",
        Errno::EOVERFLOW => "EOVERFLOW",
        Errno::ENOTCONN => "ENOTCONN",
        _ => "Unknown",
    }
}

/// Whether `error` is an acceptable value for an outbound header.
pub fn is_valid_reply_error(error: errno_t) -> bool {
    error <= 0 && error > -ERRNO_LIMIT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_string() {
        assert_eq!(to_string(0), "OK");
        assert_eq!(to_string(Errno::ENOENT), "ENOENT");
        assert_eq!(to_string(-Errno::ENOSYS), "ENOSYS");
        assert_eq!(to_string(999), "Unknown");
        assert_eq!(to_string(i32::MIN), "Unknown");
    }

    #[test]
    fn test_valid_reply_error() {
        assert!(is_valid_reply_error(0));
        assert!(is_valid_reply_error(-Errno::ENOENT));
        assert!(is_valid_reply_error(-999));
        assert!(!is_valid_reply_error(-1000));
        assert!(!is_valid_reply_error(1));
    }
}
