//! FFI bindings for AGATA
//!
//! This module provides C-compatible functions for calling AGATA from other languages.
//! All functions use C strings (null-terminated) and return allocated memory that
//! must be freed by the caller using `agata_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::error::AgataError;
use crate::pipeline::{analyze_glucose_profile_json, compare_two_arms_json};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Return the JSON result as a C string, or NULL with the error recorded
fn into_c_result(result: Result<String, AgataError>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Analysis API
// ============================================================================

/// Analyze a glucose profile and return the analysis as JSON.
///
/// The profile is a JSON array of `{"t": "YYYY-MM-DDTHH:MM:SS", "glucose": number | null}`.
///
/// # Safety
/// - `json` and `glycemic_target` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `agata_free_string`.
/// - Returns NULL on error; call `agata_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn agata_analyze_json(
    json: *const c_char,
    glycemic_target: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    let target_str = match cstr_to_string(glycemic_target) {
        Some(s) => s,
        None => {
            set_last_error("Invalid glycemic target string pointer");
            return ptr::null_mut();
        }
    };

    into_c_result(analyze_glucose_profile_json(&json_str, &target_str))
}

/// Compare two arms of glucose profiles and return results and test outcomes as JSON.
///
/// Each arm is a JSON array of profiles. `is_paired` is non-zero for paired arms.
///
/// # Safety
/// - `arm_1_json`, `arm_2_json` and `glycemic_target` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `agata_free_string`.
/// - Returns NULL on error; call `agata_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn agata_compare_arms_json(
    arm_1_json: *const c_char,
    arm_2_json: *const c_char,
    is_paired: i32,
    alpha: f64,
    glycemic_target: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let (Some(arm_1), Some(arm_2)) = (cstr_to_string(arm_1_json), cstr_to_string(arm_2_json))
    else {
        set_last_error("Invalid arm JSON string pointer");
        return ptr::null_mut();
    };

    let target_str = match cstr_to_string(glycemic_target) {
        Some(s) => s,
        None => {
            set_last_error("Invalid glycemic target string pointer");
            return ptr::null_mut();
        }
    };

    into_c_result(compare_two_arms_json(
        &arm_1,
        &arm_2,
        is_paired != 0,
        alpha,
        &target_str,
    ))
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by AGATA.
///
/// # Safety
/// - `s` must be a pointer returned by an AGATA function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn agata_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next AGATA function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn agata_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the AGATA library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn agata_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn sample_profile_json() -> CString {
        CString::new(
            r#"[
                {"t": "2021-03-01T08:00:00", "glucose": 40.0},
                {"t": "2021-03-01T08:05:00", "glucose": 60.0},
                {"t": "2021-03-01T08:10:00", "glucose": null},
                {"t": "2021-03-01T08:15:00", "glucose": 120.0},
                {"t": "2021-03-01T08:20:00", "glucose": 200.0},
                {"t": "2021-03-01T08:25:00", "glucose": 260.0}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_ffi_analyze_json() {
        let json = sample_profile_json();
        let target = CString::new("diabetes").unwrap();

        unsafe {
            let result = agata_analyze_json(json.as_ptr(), target.as_ptr());
            assert!(!result.is_null());
            assert!(agata_last_error().is_null());

            let result_str = CStr::from_ptr(result).to_str().unwrap();
            assert!(result_str.contains("time_in_ranges"));
            assert!(result_str.contains("glycemic_transformation"));

            agata_free_string(result);
        }
    }

    #[test]
    fn test_ffi_compare_arms_json() {
        let profile = sample_profile_json();
        let arm = CString::new(format!("[{0},{0}]", profile.to_str().unwrap())).unwrap();
        let target = CString::new("pregnancy").unwrap();

        unsafe {
            let result = agata_compare_arms_json(arm.as_ptr(), arm.as_ptr(), 1, 0.05, target.as_ptr());
            assert!(!result.is_null());

            let result_str = CStr::from_ptr(result).to_str().unwrap();
            assert!(result_str.contains("\"stats\""));
            assert!(result_str.contains("\"arm_2\""));

            agata_free_string(result);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let invalid_json = CString::new("not json").unwrap();
            let target = CString::new("diabetes").unwrap();

            let result = agata_analyze_json(invalid_json.as_ptr(), target.as_ptr());
            assert!(result.is_null());

            let error = agata_last_error();
            assert!(!error.is_null());
            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(error_str.starts_with("Invalid JSON"));

            let json = sample_profile_json();
            let bad_target = CString::new("type1").unwrap();
            let result = agata_analyze_json(json.as_ptr(), bad_target.as_ptr());
            assert!(result.is_null());
            let error_str = CStr::from_ptr(agata_last_error()).to_str().unwrap();
            assert!(error_str.contains("type1"));

            assert!(agata_analyze_json(ptr::null(), target.as_ptr()).is_null());
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = agata_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert_eq!(version_str, crate::AGATA_VERSION);
        }
    }
}
