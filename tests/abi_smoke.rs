// C ABI round-trip: sessions, JSON buffers, and the 1:1 error-kind codes.
use std::ptr;

use meegbind::abi::{
    mgb_buf, mgb_call, mgb_error, mgb_error_free, mgb_buf_free, mgb_session,
    mgb_session_free, mgb_session_live_objects, mgb_session_new,
};
use serde_json::{Value as Json, json};

struct Session(*mut mgb_session);

impl Session {
    fn new() -> Self {
        let mut session: *mut mgb_session = ptr::null_mut();
        let mut err: *mut mgb_error = ptr::null_mut();
        let rc = mgb_session_new(&mut session, &mut err);
        assert_eq!(rc, 0);
        assert!(err.is_null());
        Session(session)
    }

    fn call(&self, nargout: usize, args: Json) -> Result<Json, i32> {
        let bytes = serde_json::to_vec(&args).unwrap();
        let mut buf = mgb_buf::default();
        let mut err: *mut mgb_error = ptr::null_mut();
        let rc = mgb_call(
            self.0,
            nargout,
            bytes.as_ptr(),
            bytes.len(),
            &mut buf,
            &mut err,
        );
        if rc == 0 {
            assert!(err.is_null());
            let outputs: Json = serde_json::from_slice(buf.as_slice()).unwrap();
            mgb_buf_free(&mut buf);
            Ok(outputs)
        } else {
            assert!(!err.is_null());
            let kind = unsafe { (*err).kind_code() };
            mgb_error_free(err);
            Err(kind)
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        mgb_session_free(self.0);
    }
}

fn create_args() -> Json {
    json!([
        {"str": "create"},
        {"struct": {
            "type": {"str": "null"},
            "electrodes": {"struct": {"model": {"str": "test"}}}
        }}
    ])
}

#[test]
fn create_and_delete_round_trip_through_json() {
    let session = Session::new();
    let outputs = session.call(1, create_args()).expect("create");
    let outputs = outputs.as_array().unwrap();
    assert_eq!(outputs.len(), 1);
    assert!(outputs[0].get("uint64").is_some());
    assert_eq!(mgb_session_live_objects(session.0), 1);

    let delete = json!([{"str": "delete"}, outputs[0]]);
    session.call(0, delete).expect("delete");
    assert_eq!(mgb_session_live_objects(session.0), 0);
}

#[test]
fn unknown_command_maps_to_its_kind_code() {
    let session = Session::new();
    let kind = session
        .call(0, json!([{"str": "frobnicate"}]))
        .unwrap_err();
    assert_eq!(kind, 4);
}

#[test]
fn missing_command_and_arity_codes_are_stable() {
    let session = Session::new();
    assert_eq!(session.call(0, json!([])).unwrap_err(), 3);
    assert_eq!(session.call(0, create_args()).unwrap_err(), 5);
}

#[test]
fn malformed_json_is_a_usage_error() {
    let session = Session::new();
    let bytes = b"not json";
    let mut buf = mgb_buf::default();
    let mut err: *mut mgb_error = ptr::null_mut();
    let rc = mgb_call(session.0, 0, bytes.as_ptr(), bytes.len(), &mut buf, &mut err);
    assert_eq!(rc, -1);
    assert!(!err.is_null());
    assert_eq!(unsafe { (*err).kind_code() }, 2);
    mgb_error_free(err);
}

#[test]
fn null_session_is_rejected_not_dereferenced() {
    let bytes = serde_json::to_vec(&json!([{"str": "create"}])).unwrap();
    let mut buf = mgb_buf::default();
    let mut err: *mut mgb_error = ptr::null_mut();
    let rc = mgb_call(
        ptr::null_mut(),
        1,
        bytes.as_ptr(),
        bytes.len(),
        &mut buf,
        &mut err,
    );
    assert_eq!(rc, -1);
    assert_eq!(unsafe { (*err).kind_code() }, 2);
    mgb_error_free(err);
}
