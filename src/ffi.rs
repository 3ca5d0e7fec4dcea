//! FFI bindings for Wellness Labs
//!
//! This module provides C-compatible functions for driving the labs from other languages.
//! All functions use C strings (null-terminated) and return allocated memory that
//! must be freed by the caller using `labs_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::cognition::{Response, TestType, TrialStateMachine};
use crate::config::LabConfig;
use crate::error::LabError;
use crate::motor::MotorLab;
use crate::pipeline::{analyze_tremor, FrameLoop, LabStatus};
use crate::report::{LabReport, ReportEncoder, VoiceReport};
use crate::resource::SharedResource;
use crate::scoring::d_prime;
use crate::types::{AudioFrame, LandmarkFrame, LandmarkModel, Microphone};
use crate::voice::VoiceLab;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
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

/// Config from an optional JSON pointer; NULL means defaults
unsafe fn config_from_ptr(config_json: *const c_char) -> Result<LabConfig, LabError> {
    match cstr_to_string(config_json) {
        Some(json) => LabConfig::from_json(&json),
        None => Ok(LabConfig::default()),
    }
}

/// Serialize to a C string, recording failures as the last error
fn json_to_cstr<T: serde::Serialize>(value: &T) -> *mut c_char {
    match serde_json::to_string(value) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Record why a frame loop returned no metrics
fn set_frame_error(status: &LabStatus, active: bool) {
    match status {
        LabStatus::TransientError(msg) | LabStatus::CaptureFailed(msg) => set_last_error(msg),
        _ if !active => set_last_error("Lab is not active"),
        _ => set_last_error("Frame produced no metrics"),
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Compute d-prime from signal-detection counts.
///
/// # Safety
/// - Always safe to call; provided as `unsafe extern` for ABI uniformity.
#[no_mangle]
pub unsafe extern "C" fn labs_d_prime(
    hits: u32,
    misses: u32,
    false_alarms: u32,
    correct_rejections: u32,
    total_trials: u32,
) -> f64 {
    d_prime(hits, misses, false_alarms, correct_rejections, total_trials)
}

/// Analyze a tremor window and return TremorMetrics JSON.
///
/// # Safety
/// - `samples_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `labs_free_string`.
/// - Returns NULL on error; call `labs_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn labs_analyze_tremor(
    samples_json: *const c_char,
    reference_scale: f64,
) -> *mut c_char {
    clear_last_error();

    let json_str = match cstr_to_string(samples_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    match analyze_tremor(&json_str, reference_scale) {
        Ok(result) => string_to_cstr(&result),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Motor Lab API
// ============================================================================

/// Opaque handle to a running motor lab
pub struct MotorLabHandle {
    frame_loop: FrameLoop<MotorLab>,
    model: SharedResource<LandmarkModel>,
}

/// Create and start a motor lab.
///
/// # Safety
/// - `config_json` may be NULL (defaults) or a valid null-terminated C string.
/// - Must be freed with `labs_motor_free`.
/// - Returns NULL on error; call `labs_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn labs_motor_new(config_json: *const c_char) -> *mut MotorLabHandle {
    clear_last_error();

    let config = match config_from_ptr(config_json) {
        Ok(config) => config,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    let model = SharedResource::new("hand_landmarker", || Ok(LandmarkModel::hand()));
    let mut frame_loop = FrameLoop::new(MotorLab::new(config.motor));
    if let Err(e) = frame_loop.start(&model) {
        set_last_error(&e.to_string());
        return ptr::null_mut();
    }

    Box::into_raw(Box::new(MotorLabHandle { frame_loop, model }))
}

/// Process one LandmarkFrame JSON and return MotorMetrics JSON.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `labs_motor_new`.
/// - `frame_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `labs_free_string`.
/// - Returns NULL on error; call `labs_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn labs_motor_process(
    handle: *mut MotorLabHandle,
    frame_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null motor lab pointer");
        return ptr::null_mut();
    }
    let handle = &mut *handle;

    let frame: LandmarkFrame = match cstr_to_string(frame_json).map(|s| serde_json::from_str(&s)) {
        Some(Ok(frame)) => frame,
        Some(Err(e)) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    match handle.frame_loop.on_frame(&frame) {
        Some(metrics) => json_to_cstr(&metrics),
        None => {
            set_frame_error(handle.frame_loop.status(), handle.frame_loop.is_active());
            ptr::null_mut()
        }
    }
}

/// Restart a motor lab from its initial state, re-acquiring the model.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `labs_motor_new`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn labs_motor_reset(handle: *mut MotorLabHandle) -> i32 {
    clear_last_error();

    let Some(handle) = handle.as_mut() else {
        set_last_error("Null motor lab pointer");
        return -1;
    };

    handle.frame_loop.stop();
    handle.frame_loop.lab_mut().reset();
    match handle.frame_loop.start(&handle.model) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Stop and free a motor lab.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `labs_motor_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn labs_motor_free(handle: *mut MotorLabHandle) {
    if !handle.is_null() {
        let mut handle = Box::from_raw(handle);
        handle.frame_loop.stop();
    }
}

// ============================================================================
// Voice Lab API
// ============================================================================

/// Opaque handle to a running voice lab
pub struct VoiceLabHandle {
    frame_loop: FrameLoop<VoiceLab>,
    microphone: SharedResource<Microphone>,
}

/// Create and start a voice lab for a microphone stream at `sample_rate`.
///
/// # Safety
/// - `config_json` may be NULL (defaults) or a valid null-terminated C string.
/// - Must be freed with `labs_voice_free`.
/// - Returns NULL on error; call `labs_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn labs_voice_new(
    config_json: *const c_char,
    sample_rate: f64,
) -> *mut VoiceLabHandle {
    clear_last_error();

    let config = match config_from_ptr(config_json) {
        Ok(config) => config,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    let microphone = SharedResource::new("microphone", move || {
        if sample_rate > 0.0 {
            Ok(Microphone::new("default", sample_rate))
        } else {
            Err(LabError::DeviceUnavailable(format!(
                "unsupported sample rate {sample_rate}"
            )))
        }
    });
    let mut frame_loop = FrameLoop::new(VoiceLab::new(config.voice));
    if let Err(e) = frame_loop.start(&microphone) {
        set_last_error(&e.to_string());
        return ptr::null_mut();
    }

    Box::into_raw(Box::new(VoiceLabHandle {
        frame_loop,
        microphone,
    }))
}

/// Process one AudioFrame JSON and return VoiceMetrics JSON.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `labs_voice_new`.
/// - `frame_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `labs_free_string`.
/// - Returns NULL on error; call `labs_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn labs_voice_process(
    handle: *mut VoiceLabHandle,
    frame_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null voice lab pointer");
        return ptr::null_mut();
    }
    let handle = &mut *handle;

    let frame: AudioFrame = match cstr_to_string(frame_json).map(|s| serde_json::from_str(&s)) {
        Some(Ok(frame)) => frame,
        Some(Err(e)) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    match handle.frame_loop.on_frame(&frame) {
        Some(metrics) => json_to_cstr(&metrics),
        None => {
            set_frame_error(handle.frame_loop.status(), handle.frame_loop.is_active());
            ptr::null_mut()
        }
    }
}

/// Start a recording session. `duration_ms <= 0` uses the configured length.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `labs_voice_new`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn labs_voice_start_recording(
    handle: *mut VoiceLabHandle,
    now_ms: f64,
    duration_ms: f64,
) -> i32 {
    clear_last_error();

    let Some(handle) = handle.as_mut() else {
        set_last_error("Null voice lab pointer");
        return -1;
    };

    let duration = (duration_ms > 0.0).then_some(duration_ms);
    handle
        .frame_loop
        .lab_mut()
        .start_recording(now_ms, duration);
    0
}

/// Fire due voice timers. Returns VoiceReport payload JSON when the recording
/// finished, NULL otherwise.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `labs_voice_new`.
/// - A non-NULL result must be freed with `labs_free_string`.
#[no_mangle]
pub unsafe extern "C" fn labs_voice_tick(handle: *mut VoiceLabHandle, now_ms: f64) -> *mut c_char {
    clear_last_error();

    let Some(handle) = handle.as_mut() else {
        set_last_error("Null voice lab pointer");
        return ptr::null_mut();
    };

    match handle.frame_loop.lab_mut().tick(now_ms) {
        Some(summary) => {
            let report = LabReport::Voice(VoiceReport {
                timestamp: chrono::Utc::now(),
                summary,
            });
            match ReportEncoder::new().encode_to_json(report) {
                Ok(json) => string_to_cstr(&json),
                Err(e) => {
                    set_last_error(&e.to_string());
                    ptr::null_mut()
                }
            }
        }
        None => ptr::null_mut(),
    }
}

/// Restart a voice lab from its initial state, reopening the microphone.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `labs_voice_new`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn labs_voice_reset(handle: *mut VoiceLabHandle) -> i32 {
    clear_last_error();

    let Some(handle) = handle.as_mut() else {
        set_last_error("Null voice lab pointer");
        return -1;
    };

    handle.frame_loop.stop();
    handle.frame_loop.lab_mut().reset();
    match handle.frame_loop.start(&handle.microphone) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Stop and free a voice lab.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `labs_voice_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn labs_voice_free(handle: *mut VoiceLabHandle) {
    if !handle.is_null() {
        let mut handle = Box::from_raw(handle);
        handle.frame_loop.stop();
    }
}

// ============================================================================
// Cognition API
// ============================================================================

/// Opaque handle to a cognition session
pub struct CognitionHandle {
    machine: TrialStateMachine,
}

/// Create a cognition session.
///
/// # Safety
/// - `test_type` must be a valid null-terminated C string: "stroop", "n_back" or "go_no_go".
/// - `config_json` may be NULL (defaults) or a valid null-terminated C string.
/// - `seed < 0` draws the stimulus sequence from entropy.
/// - Must be freed with `labs_cognition_free`.
/// - Returns NULL on error; call `labs_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn labs_cognition_new(
    test_type: *const c_char,
    config_json: *const c_char,
    seed: i64,
) -> *mut CognitionHandle {
    clear_last_error();

    let test_type: TestType = match cstr_to_string(test_type)
        .map(|s| serde_json::from_value(serde_json::Value::String(s)))
    {
        Some(Ok(test_type)) => test_type,
        Some(Err(e)) => {
            set_last_error(&format!("Unknown test type: {e}"));
            return ptr::null_mut();
        }
        None => {
            set_last_error("Invalid test type string pointer");
            return ptr::null_mut();
        }
    };

    let config = match config_from_ptr(config_json) {
        Ok(config) => config,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    let seed = (seed >= 0).then_some(seed as u64);
    let machine = TrialStateMachine::new(test_type, config.cognition, seed);
    Box::into_raw(Box::new(CognitionHandle { machine }))
}

/// Start (or restart) the session at `now_ms`.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `labs_cognition_new`, or NULL.
#[no_mangle]
pub unsafe extern "C" fn labs_cognition_start(handle: *mut CognitionHandle, now_ms: f64) {
    if let Some(handle) = handle.as_mut() {
        handle.machine.start(now_ms);
    }
}

/// Fire due timers and return the resulting events as a JSON array.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `labs_cognition_new`.
/// - Returns a newly allocated string that must be freed with `labs_free_string`.
/// - Returns NULL on error; call `labs_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn labs_cognition_advance(
    handle: *mut CognitionHandle,
    now_ms: f64,
) -> *mut c_char {
    clear_last_error();

    let Some(handle) = handle.as_mut() else {
        set_last_error("Null cognition pointer");
        return ptr::null_mut();
    };

    let events = handle.machine.advance(now_ms);
    json_to_cstr(&events)
}

/// Deliver a Response JSON. Returns the resolved Trial JSON, or NULL if the
/// response was ignored (no error is set in that case).
///
/// # Safety
/// - `handle` must be a valid pointer returned by `labs_cognition_new`.
/// - `response_json` must be a valid null-terminated C string.
/// - A non-NULL result must be freed with `labs_free_string`.
#[no_mangle]
pub unsafe extern "C" fn labs_cognition_respond(
    handle: *mut CognitionHandle,
    response_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(handle) = handle.as_mut() else {
        set_last_error("Null cognition pointer");
        return ptr::null_mut();
    };

    let response: Response =
        match cstr_to_string(response_json).map(|s| serde_json::from_str(&s)) {
            Some(Ok(response)) => response,
            Some(Err(e)) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
            None => {
                set_last_error("Invalid JSON string pointer");
                return ptr::null_mut();
            }
        };

    match handle.machine.respond(response) {
        Some(trial) => json_to_cstr(&trial),
        None => ptr::null_mut(),
    }
}

/// Cancel all timers and return the session to ready.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `labs_cognition_new`, or NULL.
#[no_mangle]
pub unsafe extern "C" fn labs_cognition_reset(handle: *mut CognitionHandle) {
    if let Some(handle) = handle.as_mut() {
        handle.machine.reset();
    }
}

/// Report payload JSON for a completed session.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `labs_cognition_new`.
/// - Returns a newly allocated string that must be freed with `labs_free_string`.
/// - Returns NULL if the session is not complete; call `labs_last_error` for details.
#[no_mangle]
pub unsafe extern "C" fn labs_cognition_report(handle: *mut CognitionHandle) -> *mut c_char {
    clear_last_error();

    let Some(handle) = handle.as_ref() else {
        set_last_error("Null cognition pointer");
        return ptr::null_mut();
    };

    let Some(report) = handle.machine.report() else {
        set_last_error("Session is not complete");
        return ptr::null_mut();
    };

    match ReportEncoder::new().encode_to_json(LabReport::Cognition(report)) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a cognition session.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `labs_cognition_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn labs_cognition_free(handle: *mut CognitionHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Labs functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Labs function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn labs_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Labs function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn labs_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the Labs library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn labs_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn landmark_frame_json(t: f64, landmarks: usize) -> CString {
        let points: Vec<serde_json::Value> = (0..landmarks)
            .map(|_| serde_json::json!({ "x": 0.5, "y": 0.5 }))
            .collect();
        let frame = serde_json::json!({
            "timestamp_ms": t,
            "width": 640.0,
            "height": 480.0,
            "points": points,
        });
        CString::new(frame.to_string()).unwrap()
    }

    #[test]
    fn test_ffi_motor_lifecycle() {
        unsafe {
            let lab = labs_motor_new(ptr::null());
            assert!(!lab.is_null());

            let frame = landmark_frame_json(0.0, 21);
            let result = labs_motor_process(lab, frame.as_ptr());
            assert!(!result.is_null());

            let result_str = CStr::from_ptr(result).to_str().unwrap();
            let metrics: serde_json::Value = serde_json::from_str(result_str).unwrap();
            assert_eq!(metrics["tap_count"], 1);
            labs_free_string(result);

            assert_eq!(labs_motor_reset(lab), 0);
            let result = labs_motor_process(lab, frame.as_ptr());
            let result_str = CStr::from_ptr(result).to_str().unwrap();
            let metrics: serde_json::Value = serde_json::from_str(result_str).unwrap();
            assert_eq!(metrics["tap_count"], 1);
            labs_free_string(result);

            labs_motor_free(lab);
        }
    }

    #[test]
    fn test_ffi_motor_malformed_frame() {
        unsafe {
            let lab = labs_motor_new(ptr::null());
            let frame = landmark_frame_json(0.0, 4);

            let result = labs_motor_process(lab, frame.as_ptr());
            assert!(result.is_null());

            let error = CStr::from_ptr(labs_last_error()).to_str().unwrap();
            assert!(error.contains("Malformed frame"));

            labs_motor_free(lab);
        }
    }

    #[test]
    fn test_ffi_cognition_session() {
        unsafe {
            let test_type = CString::new("go_no_go").unwrap();
            let session = labs_cognition_new(test_type.as_ptr(), ptr::null(), 42);
            assert!(!session.is_null());

            labs_cognition_start(session, 0.0);
            assert!(labs_cognition_report(session).is_null());

            let events = labs_cognition_advance(session, 1.0e9);
            assert!(!events.is_null());
            let events_str = CStr::from_ptr(events).to_str().unwrap();
            assert!(events_str.contains("completed"));
            labs_free_string(events);

            let report = labs_cognition_report(session);
            assert!(!report.is_null());
            let report_str = CStr::from_ptr(report).to_str().unwrap();
            assert!(report_str.contains("\"producer\""));
            labs_free_string(report);

            labs_cognition_free(session);
        }
    }

    #[test]
    fn test_ffi_unknown_test_type() {
        unsafe {
            let test_type = CString::new("chess").unwrap();
            let session = labs_cognition_new(test_type.as_ptr(), ptr::null(), 1);
            assert!(session.is_null());
            assert!(!labs_last_error().is_null());
        }
    }

    #[test]
    fn test_ffi_d_prime_and_tremor() {
        unsafe {
            assert_eq!(labs_d_prime(5, 5, 5, 5, 20), 0.0);

            let invalid_json = CString::new("not json").unwrap();
            let result = labs_analyze_tremor(invalid_json.as_ptr(), 480.0);
            assert!(result.is_null());

            let error = labs_last_error();
            assert!(!error.is_null());
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = labs_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
