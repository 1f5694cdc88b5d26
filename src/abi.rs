//! Purpose: C ABI bridge for host environments loading the binding as a
//! shared module (libmeegbind).
//! Exports: C-callable session/call functions and buffer/error helpers.
//! Role: Stable ABI surface for non-Rust hosts in v0.
//! Invariants: JSON bytes in/out; opaque session pointers; explicit free
//! functions for every allocation crossing the boundary.
//! Invariants: Error kinds map 1:1 with core error kinds.
//! Invariants: Panics never unwind across the boundary; they surface as
//! `Internal` errors.
//! Notes: v0 sessions carry the built-in backend registry; additional
//! backends are registered through the Rust API.
#![allow(non_camel_case_types)]

use std::ffi::CString;
use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use crate::core::error::{Error, ErrorKind};
use crate::core::value::Value;
use crate::dispatch::Binding;
use crate::driver::factory::FactoryRegistry;

#[repr(C)]
pub struct mgb_session {
    binding: Binding,
}

#[repr(C)]
pub struct mgb_buf {
    data: *mut u8,
    len: usize,
}

impl Default for mgb_buf {
    fn default() -> Self {
        Self {
            data: ptr::null_mut(),
            len: 0,
        }
    }
}

impl mgb_buf {
    /// Borrow the buffer contents; empty when unset or already freed.
    pub fn as_slice(&self) -> &[u8] {
        if self.data.is_null() {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(self.data, self.len) }
        }
    }
}

#[repr(C)]
pub struct mgb_error {
    kind: i32,
    message: *mut c_char,
    command: *mut c_char,
    hint: *mut c_char,
}

#[unsafe(no_mangle)]
pub extern "C" fn mgb_session_new(
    out_session: *mut *mut mgb_session,
    out_err: *mut *mut mgb_error,
) -> i32 {
    if out_session.is_null() {
        return fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("out_session is null"),
        );
    }
    let handle = Box::new(mgb_session {
        binding: Binding::new(FactoryRegistry::with_defaults()),
    });
    unsafe {
        *out_session = Box::into_raw(handle);
    }
    0
}

#[unsafe(no_mangle)]
pub extern "C" fn mgb_session_free(session: *mut mgb_session) {
    if session.is_null() {
        return;
    }
    unsafe {
        drop(Box::from_raw(session));
    }
}

/// Dispatch one command. `args_json` is a JSON array of host values whose
/// first element is the command name; outputs come back as a JSON array.
#[unsafe(no_mangle)]
pub extern "C" fn mgb_call(
    session: *mut mgb_session,
    nargout: usize,
    args_json: *const u8,
    args_len: usize,
    out_buf: *mut mgb_buf,
    out_err: *mut *mut mgb_error,
) -> i32 {
    let session = match borrow_session(session, out_err) {
        Ok(session) => session,
        Err(code) => return code,
    };
    let args = match parse_args(args_json, args_len) {
        Ok(args) => args,
        Err(err) => return fail(out_err, err),
    };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| session.binding.call(nargout, &args)));
    let outputs = match outcome {
        Ok(Ok(outputs)) => outputs,
        Ok(Err(err)) => return fail(out_err, err),
        Err(_) => {
            return fail(
                out_err,
                Error::new(ErrorKind::Internal).with_message("panic in command handler"),
            );
        }
    };
    if let Err(err) = write_outputs_buf(out_buf, &outputs) {
        return fail(out_err, err);
    }
    0
}

/// Number of live native objects in the session.
#[unsafe(no_mangle)]
pub extern "C" fn mgb_session_live_objects(session: *mut mgb_session) -> u64 {
    if session.is_null() {
        return 0;
    }
    let session = unsafe { &*session };
    session.binding.live_objects() as u64
}

#[unsafe(no_mangle)]
pub extern "C" fn mgb_buf_free(buf: *mut mgb_buf) {
    if buf.is_null() {
        return;
    }
    unsafe {
        let buf = &mut *buf;
        if !buf.data.is_null() {
            drop(Vec::from_raw_parts(buf.data, buf.len, buf.len));
            buf.data = ptr::null_mut();
            buf.len = 0;
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn mgb_error_free(err: *mut mgb_error) {
    if err.is_null() {
        return;
    }
    unsafe {
        let err = Box::from_raw(err);
        for text in [err.message, err.command, err.hint] {
            if !text.is_null() {
                drop(CString::from_raw(text));
            }
        }
    }
}

fn borrow_session<'a>(
    session: *mut mgb_session,
    out_err: *mut *mut mgb_error,
) -> Result<&'a mut mgb_session, i32> {
    if session.is_null() {
        return Err(fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("session is null"),
        ));
    }
    Ok(unsafe { &mut *session })
}

fn parse_args(args_json: *const u8, args_len: usize) -> Result<Vec<Value>, Error> {
    if args_json.is_null() {
        if args_len == 0 {
            return Ok(Vec::new());
        }
        return Err(Error::new(ErrorKind::Usage).with_message("args_json is null"));
    }
    let bytes = unsafe { std::slice::from_raw_parts(args_json, args_len) };
    serde_json::from_slice(bytes).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("args_json is not a JSON array of host values")
            .with_source(err)
    })
}

fn write_outputs_buf(out_buf: *mut mgb_buf, outputs: &[Value]) -> Result<(), Error> {
    if out_buf.is_null() {
        return Err(Error::new(ErrorKind::Usage).with_message("out_buf is null"));
    }
    let json_bytes = serde_json::to_vec(outputs).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to serialize outputs")
            .with_source(err)
    })?;
    unsafe {
        let buf = &mut *out_buf;
        let mut data = json_bytes.into_boxed_slice();
        buf.len = data.len();
        buf.data = data.as_mut_ptr();
        std::mem::forget(data);
    }
    Ok(())
}

fn fail(out_err: *mut *mut mgb_error, err: Error) -> i32 {
    if out_err.is_null() {
        return -1;
    }
    let error = Box::new(mgb_error {
        kind: error_kind_code(err.kind()),
        message: to_c_string(err.message().unwrap_or("")),
        command: err.command().map(to_c_string).unwrap_or(ptr::null_mut()),
        hint: err.hint().map(to_c_string).unwrap_or(ptr::null_mut()),
    });
    unsafe {
        *out_err = Box::into_raw(error);
    }
    -1
}

fn to_c_string(input: &str) -> *mut c_char {
    CString::new(input)
        .map(|s| s.into_raw())
        .unwrap_or(ptr::null_mut())
}

fn error_kind_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::MissingCommand => 3,
        ErrorKind::UnknownCommand => 4,
        ErrorKind::ArityMismatch => 5,
        ErrorKind::ShapeMismatch => 6,
        ErrorKind::UnsupportedFieldType => 7,
        ErrorKind::IndexOutOfBounds => 8,
        ErrorKind::CountMismatch => 9,
        ErrorKind::InvalidHandle => 10,
        ErrorKind::Driver => 11,
        ErrorKind::Io => 12,
    }
}

impl mgb_error {
    pub fn kind_code(&self) -> i32 {
        self.kind
    }
}
