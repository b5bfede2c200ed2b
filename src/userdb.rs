//! User account lookups via the system passwd database.
//!
//! Thin safe wrappers over `getpwnam_r` / `getpwuid_r`. Numeric identifiers
//! are accepted as a fallback so role state on paths owned by accounts not
//! present in this host's passwd database still round-trips.

use std::ffi::{CStr, CString};

/// Buffer size for the reentrant passwd calls.
///
/// `sysconf(_SC_GETPW_R_SIZE_MAX)` commonly reports 1024; a fixed 16 KiB
/// buffer covers long GECOS fields without a retry loop.
const PW_BUF_LEN: usize = 16 * 1024;

/// Resolve a user name to a uid.
///
/// Accepts a plain numeric string as a literal uid.
#[must_use]
pub fn uid_for_name(name: &str) -> Option<u32> {
    if let Ok(uid) = name.parse::<u32>() {
        return Some(uid);
    }
    let c_name = CString::new(name).ok()?;
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut buf = vec![0_u8; PW_BUF_LEN];
    let mut result: *mut libc::passwd = std::ptr::null_mut();

    let rc = unsafe {
        libc::getpwnam_r(
            c_name.as_ptr(),
            &mut pwd,
            buf.as_mut_ptr().cast::<libc::c_char>(),
            buf.len(),
            &mut result,
        )
    };
    if rc != 0 || result.is_null() {
        return None;
    }
    Some(pwd.pw_uid)
}

/// Resolve a uid to a user name.
///
/// Falls back to the decimal uid when the account is unknown, so reporting
/// never loses entries.
#[must_use]
pub fn name_for_uid(uid: u32) -> String {
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut buf = vec![0_u8; PW_BUF_LEN];
    let mut result: *mut libc::passwd = std::ptr::null_mut();

    let rc = unsafe {
        libc::getpwuid_r(
            uid,
            &mut pwd,
            buf.as_mut_ptr().cast::<libc::c_char>(),
            buf.len(),
            &mut result,
        )
    };
    if rc == 0 && !result.is_null() && !pwd.pw_name.is_null() {
        let name = unsafe { CStr::from_ptr(pwd.pw_name) };
        if let Ok(s) = name.to_str() {
            return s.to_string();
        }
    }
    uid.to_string()
}

/// Name of the account invoking the operation.
///
/// Used to reject self-assignment before any traversal begins.
#[must_use]
pub fn current_username() -> String {
    let uid = unsafe { libc::geteuid() };
    name_for_uid(uid)
}
