//! libmpv backend
//!
//! Hand-declared client-API surface plus a safe handle wrapper. Only the
//! entry points the pipeline consumes are declared: handle lifecycle,
//! typed options/properties, commands, log-message requests, the
//! read-only stream-callback protocol, and the event wait.
//!
//! libmpv requires `LC_NUMERIC` to be the "C" locale; Rust binaries never
//! call `setlocale`, so the process stays in the "C" locale and no locale
//! juggling is needed here.

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::error;

use crate::api::{DecoderBackend, DecoderHandle, PropertyFormat, PropertyValue, StreamSource};
use crate::error::{DecoderError, Result};
use crate::event::{DecoderEvent, LogLevel, LogMessage};

#[allow(non_camel_case_types, dead_code)]
mod sys {
    use std::ffi::{c_char, c_int, c_void};

    #[repr(C)]
    pub struct mpv_handle {
        _private: [u8; 0],
    }

    pub type mpv_format = c_int;
    pub const MPV_FORMAT_STRING: mpv_format = 1;
    pub const MPV_FORMAT_FLAG: mpv_format = 3;
    pub const MPV_FORMAT_INT64: mpv_format = 4;
    pub const MPV_FORMAT_DOUBLE: mpv_format = 5;

    pub type mpv_event_id = c_int;
    pub const MPV_EVENT_NONE: mpv_event_id = 0;
    pub const MPV_EVENT_SHUTDOWN: mpv_event_id = 1;
    pub const MPV_EVENT_LOG_MESSAGE: mpv_event_id = 2;

    pub const MPV_ERROR_INVALID_PARAMETER: c_int = -4;
    pub const MPV_ERROR_LOADING_FAILED: c_int = -13;
    pub const MPV_ERROR_UNSUPPORTED: c_int = -18;

    #[repr(C)]
    pub struct mpv_event {
        pub event_id: mpv_event_id,
        pub error: c_int,
        pub reply_userdata: u64,
        pub data: *mut c_void,
    }

    #[repr(C)]
    pub struct mpv_event_log_message {
        pub prefix: *const c_char,
        pub level: *const c_char,
        pub text: *const c_char,
        pub log_level: c_int,
    }

    pub type mpv_stream_cb_read_fn =
        unsafe extern "C" fn(cookie: *mut c_void, buf: *mut c_char, nbytes: u64) -> i64;
    pub type mpv_stream_cb_seek_fn =
        unsafe extern "C" fn(cookie: *mut c_void, offset: i64) -> i64;
    pub type mpv_stream_cb_size_fn = unsafe extern "C" fn(cookie: *mut c_void) -> i64;
    pub type mpv_stream_cb_close_fn = unsafe extern "C" fn(cookie: *mut c_void);
    pub type mpv_stream_cb_cancel_fn = unsafe extern "C" fn(cookie: *mut c_void);

    #[repr(C)]
    pub struct mpv_stream_cb_info {
        pub cookie: *mut c_void,
        pub read_fn: Option<mpv_stream_cb_read_fn>,
        pub seek_fn: Option<mpv_stream_cb_seek_fn>,
        pub size_fn: Option<mpv_stream_cb_size_fn>,
        pub close_fn: Option<mpv_stream_cb_close_fn>,
        pub cancel_fn: Option<mpv_stream_cb_cancel_fn>,
    }

    pub type mpv_stream_cb_open_ro_fn = unsafe extern "C" fn(
        user_data: *mut c_void,
        uri: *mut c_char,
        info: *mut mpv_stream_cb_info,
    ) -> c_int;

    #[link(name = "mpv")]
    extern "C" {
        pub fn mpv_create() -> *mut mpv_handle;
        pub fn mpv_initialize(ctx: *mut mpv_handle) -> c_int;
        pub fn mpv_terminate_destroy(ctx: *mut mpv_handle);
        pub fn mpv_set_option(
            ctx: *mut mpv_handle,
            name: *const c_char,
            format: mpv_format,
            data: *mut c_void,
        ) -> c_int;
        pub fn mpv_set_option_string(
            ctx: *mut mpv_handle,
            name: *const c_char,
            data: *const c_char,
        ) -> c_int;
        pub fn mpv_command(ctx: *mut mpv_handle, args: *mut *const c_char) -> c_int;
        pub fn mpv_get_property(
            ctx: *mut mpv_handle,
            name: *const c_char,
            format: mpv_format,
            data: *mut c_void,
        ) -> c_int;
        pub fn mpv_set_property(
            ctx: *mut mpv_handle,
            name: *const c_char,
            format: mpv_format,
            data: *mut c_void,
        ) -> c_int;
        pub fn mpv_set_property_string(
            ctx: *mut mpv_handle,
            name: *const c_char,
            data: *const c_char,
        ) -> c_int;
        pub fn mpv_request_log_messages(ctx: *mut mpv_handle, min_level: *const c_char) -> c_int;
        pub fn mpv_stream_cb_add_ro(
            ctx: *mut mpv_handle,
            protocol: *const c_char,
            user_data: *mut c_void,
            open_fn: mpv_stream_cb_open_ro_fn,
        ) -> c_int;
        pub fn mpv_wait_event(ctx: *mut mpv_handle, timeout: f64) -> *mut mpv_event;
        pub fn mpv_error_string(error: c_int) -> *const c_char;
        pub fn mpv_free(data: *mut c_void);
    }
}

/// Stream callbacks below run on decoder-internal threads. They only
/// touch the `Arc<dyn StreamSource>` behind the cookie, never the handle,
/// which is the library's re-entrancy contract.
type Cookie = Arc<dyn StreamSource>;

unsafe extern "C" fn stream_open(
    user_data: *mut c_void,
    _uri: *mut c_char,
    info: *mut sys::mpv_stream_cb_info,
) -> c_int {
    if user_data.is_null() || info.is_null() {
        return sys::MPV_ERROR_LOADING_FAILED;
    }
    // SAFETY: user_data is the leaked Box<Cookie> the handle registered
    // and keeps alive until after terminate-destroy.
    unsafe {
        (*info).cookie = user_data;
        (*info).read_fn = Some(stream_read);
        (*info).seek_fn = Some(stream_seek);
        (*info).size_fn = Some(stream_size);
        (*info).close_fn = Some(stream_close);
        (*info).cancel_fn = None;
    }
    0
}

unsafe extern "C" fn stream_read(cookie: *mut c_void, buf: *mut c_char, nbytes: u64) -> i64 {
    if cookie.is_null() || buf.is_null() || nbytes == 0 {
        return 0;
    }
    // SAFETY: cookie is a live Box<Cookie>; buf is a decoder-owned buffer
    // of nbytes writable bytes for the duration of this call.
    let source = unsafe { &*(cookie as *const Cookie) };
    let len = usize::try_from(nbytes).unwrap_or(usize::MAX);
    // SAFETY: see above.
    let dst = unsafe { std::slice::from_raw_parts_mut(buf as *mut u8, len) };
    source.read(dst) as i64
}

unsafe extern "C" fn stream_seek(cookie: *mut c_void, offset: i64) -> i64 {
    if cookie.is_null() || offset < 0 {
        return i64::from(sys::MPV_ERROR_UNSUPPORTED);
    }
    // SAFETY: cookie is a live Box<Cookie>.
    let source = unsafe { &*(cookie as *const Cookie) };
    if source.seek(offset as u64) {
        offset
    } else {
        i64::from(sys::MPV_ERROR_UNSUPPORTED)
    }
}

unsafe extern "C" fn stream_size(cookie: *mut c_void) -> i64 {
    if cookie.is_null() {
        return i64::from(sys::MPV_ERROR_UNSUPPORTED);
    }
    // SAFETY: cookie is a live Box<Cookie>.
    let source = unsafe { &*(cookie as *const Cookie) };
    match source.size() {
        Some(size) => size as i64,
        None => i64::from(sys::MPV_ERROR_UNSUPPORTED),
    }
}

unsafe extern "C" fn stream_close(cookie: *mut c_void) {
    if cookie.is_null() {
        return;
    }
    // SAFETY: cookie is a live Box<Cookie>; ownership stays with the
    // handle, close only notifies the source.
    let source = unsafe { &*(cookie as *const Cookie) };
    source.close();
}

/// Factory for real libmpv handles.
pub struct MpvBackend;

impl DecoderBackend for MpvBackend {
    fn create_handle(&self) -> Result<Arc<dyn DecoderHandle>> {
        Ok(Arc::new(MpvHandle::create()?))
    }
}

/// One libmpv context.
struct MpvHandle {
    ctx: *mut sys::mpv_handle,
    /// Leaked stream cookies, released after terminate-destroy.
    cookies: Mutex<Vec<*mut Cookie>>,
}

// SAFETY: the libmpv client API is thread-safe for every entry point this
// wrapper exposes; the context pointer may be used from any thread. The
// cookie pointers are only dereferenced by decoder callbacks while the
// context is alive and are freed after terminate-destroy returns.
unsafe impl Send for MpvHandle {}
// SAFETY: as above.
unsafe impl Sync for MpvHandle {}

impl MpvHandle {
    fn create() -> Result<Self> {
        // SAFETY: no preconditions; a null return means creation failed.
        let ctx = unsafe { sys::mpv_create() };
        if ctx.is_null() {
            error!("mpv_create returned null");
            return Err(DecoderError::Create);
        }
        Ok(Self {
            ctx,
            cookies: Mutex::new(Vec::new()),
        })
    }

    fn cstring(&self, call: &'static str, value: &str) -> Result<CString> {
        CString::new(value).map_err(|_| {
            error!(call, value, "argument contains an embedded NUL");
            DecoderError::Call {
                call,
                args: value.to_string(),
                code: sys::MPV_ERROR_INVALID_PARAMETER,
                message: "argument contains an embedded NUL".to_string(),
            }
        })
    }

    fn check(&self, code: c_int, call: &'static str, args: String) -> Result<()> {
        if code >= 0 {
            return Ok(());
        }
        // SAFETY: mpv_error_string returns a static string for any code.
        let message = unsafe { CStr::from_ptr(sys::mpv_error_string(code)) }
            .to_string_lossy()
            .into_owned();
        error!(call, args = %args, code, message = %message, "decoder call failed");
        Err(DecoderError::Call {
            call,
            args,
            code,
            message,
        })
    }
}

impl DecoderHandle for MpvHandle {
    fn set_option(&self, name: &str, value: PropertyValue) -> Result<()> {
        let name_c = self.cstring("set_option", name)?;
        let code = match &value {
            PropertyValue::Flag(v) => {
                let mut flag: c_int = c_int::from(*v);
                // SAFETY: name_c and the flag outlive the call.
                unsafe {
                    sys::mpv_set_option(
                        self.ctx,
                        name_c.as_ptr(),
                        sys::MPV_FORMAT_FLAG,
                        (&mut flag as *mut c_int).cast(),
                    )
                }
            }
            PropertyValue::Int(v) => {
                let mut v = *v;
                // SAFETY: as above.
                unsafe {
                    sys::mpv_set_option(
                        self.ctx,
                        name_c.as_ptr(),
                        sys::MPV_FORMAT_INT64,
                        (&mut v as *mut i64).cast(),
                    )
                }
            }
            PropertyValue::Double(v) => {
                let mut v = *v;
                // SAFETY: as above.
                unsafe {
                    sys::mpv_set_option(
                        self.ctx,
                        name_c.as_ptr(),
                        sys::MPV_FORMAT_DOUBLE,
                        (&mut v as *mut f64).cast(),
                    )
                }
            }
            PropertyValue::Text(v) => {
                let v_c = self.cstring("set_option", v)?;
                // SAFETY: both strings outlive the call.
                unsafe { sys::mpv_set_option_string(self.ctx, name_c.as_ptr(), v_c.as_ptr()) }
            }
        };
        self.check(code, "set_option", format!("{name}, {value}"))
    }

    fn initialize(&self) -> Result<()> {
        // SAFETY: ctx is a live uninitialized handle.
        let code = unsafe { sys::mpv_initialize(self.ctx) };
        self.check(code, "initialize", String::new())
    }

    fn command(&self, args: &[&str]) -> Result<()> {
        let mut owned = Vec::with_capacity(args.len());
        for arg in args {
            owned.push(self.cstring("command", arg)?);
        }
        let mut argv: Vec<*const c_char> = owned.iter().map(|a| a.as_ptr()).collect();
        argv.push(std::ptr::null());

        // SAFETY: argv is a null-terminated array of pointers into owned
        // CStrings that outlive the call.
        let code = unsafe { sys::mpv_command(self.ctx, argv.as_mut_ptr()) };
        self.check(code, "command", args.join(", "))
    }

    fn get_property(&self, name: &str, format: PropertyFormat) -> Result<PropertyValue> {
        let name_c = self.cstring("get_property", name)?;
        match format {
            PropertyFormat::Flag => {
                let mut v: c_int = 0;
                // SAFETY: v is a valid out-slot for MPV_FORMAT_FLAG.
                let code = unsafe {
                    sys::mpv_get_property(
                        self.ctx,
                        name_c.as_ptr(),
                        sys::MPV_FORMAT_FLAG,
                        (&mut v as *mut c_int).cast(),
                    )
                };
                self.check(code, "get_property", name.to_string())?;
                Ok(PropertyValue::Flag(v != 0))
            }
            PropertyFormat::Int => {
                let mut v: i64 = 0;
                // SAFETY: v is a valid out-slot for MPV_FORMAT_INT64.
                let code = unsafe {
                    sys::mpv_get_property(
                        self.ctx,
                        name_c.as_ptr(),
                        sys::MPV_FORMAT_INT64,
                        (&mut v as *mut i64).cast(),
                    )
                };
                self.check(code, "get_property", name.to_string())?;
                Ok(PropertyValue::Int(v))
            }
            PropertyFormat::Double => {
                let mut v: f64 = 0.0;
                // SAFETY: v is a valid out-slot for MPV_FORMAT_DOUBLE.
                let code = unsafe {
                    sys::mpv_get_property(
                        self.ctx,
                        name_c.as_ptr(),
                        sys::MPV_FORMAT_DOUBLE,
                        (&mut v as *mut f64).cast(),
                    )
                };
                self.check(code, "get_property", name.to_string())?;
                Ok(PropertyValue::Double(v))
            }
            PropertyFormat::Text => {
                let mut v: *mut c_char = std::ptr::null_mut();
                // SAFETY: v is a valid out-slot for MPV_FORMAT_STRING; on
                // success the decoder allocates the string.
                let code = unsafe {
                    sys::mpv_get_property(
                        self.ctx,
                        name_c.as_ptr(),
                        sys::MPV_FORMAT_STRING,
                        (&mut v as *mut *mut c_char).cast(),
                    )
                };
                self.check(code, "get_property", name.to_string())?;
                // SAFETY: on success v is a decoder-allocated C string that
                // must be released with mpv_free.
                let text = unsafe {
                    let text = CStr::from_ptr(v).to_string_lossy().into_owned();
                    sys::mpv_free(v.cast());
                    text
                };
                Ok(PropertyValue::Text(text))
            }
        }
    }

    fn set_property(&self, name: &str, value: PropertyValue) -> Result<()> {
        let name_c = self.cstring("set_property", name)?;
        let code = match &value {
            PropertyValue::Flag(v) => {
                let mut flag: c_int = c_int::from(*v);
                // SAFETY: name_c and the flag outlive the call.
                unsafe {
                    sys::mpv_set_property(
                        self.ctx,
                        name_c.as_ptr(),
                        sys::MPV_FORMAT_FLAG,
                        (&mut flag as *mut c_int).cast(),
                    )
                }
            }
            PropertyValue::Int(v) => {
                let mut v = *v;
                // SAFETY: as above.
                unsafe {
                    sys::mpv_set_property(
                        self.ctx,
                        name_c.as_ptr(),
                        sys::MPV_FORMAT_INT64,
                        (&mut v as *mut i64).cast(),
                    )
                }
            }
            PropertyValue::Double(v) => {
                let mut v = *v;
                // SAFETY: as above.
                unsafe {
                    sys::mpv_set_property(
                        self.ctx,
                        name_c.as_ptr(),
                        sys::MPV_FORMAT_DOUBLE,
                        (&mut v as *mut f64).cast(),
                    )
                }
            }
            PropertyValue::Text(v) => {
                let v_c = self.cstring("set_property", v)?;
                // SAFETY: both strings outlive the call.
                unsafe { sys::mpv_set_property_string(self.ctx, name_c.as_ptr(), v_c.as_ptr()) }
            }
        };
        self.check(code, "set_property", format!("{name}, {value}"))
    }

    fn request_log_messages(&self, min_level: &str) -> Result<()> {
        let level_c = self.cstring("request_log_messages", min_level)?;
        // SAFETY: level_c outlives the call.
        let code = unsafe { sys::mpv_request_log_messages(self.ctx, level_c.as_ptr()) };
        self.check(code, "request_log_messages", min_level.to_string())
    }

    fn register_stream_source(&self, scheme: &str, source: Arc<dyn StreamSource>) -> Result<()> {
        let scheme_c = self.cstring("register_stream_protocol", scheme)?;
        let cookie = Box::into_raw(Box::new(source));

        // SAFETY: scheme_c outlives the call; cookie stays valid until
        // after terminate-destroy (freed in Drop).
        let code = unsafe {
            sys::mpv_stream_cb_add_ro(self.ctx, scheme_c.as_ptr(), cookie.cast(), stream_open)
        };
        if code < 0 {
            // SAFETY: registration failed, so the decoder never saw the
            // cookie and it can be reclaimed immediately.
            unsafe { drop(Box::from_raw(cookie)) };
            return self.check(code, "register_stream_protocol", scheme.to_string());
        }

        self.cookies.lock().push(cookie);
        Ok(())
    }

    fn wait_event(&self, timeout: Duration) -> DecoderEvent {
        // SAFETY: ctx is live; wait_event returns a pointer valid until
        // the next wait_event call on this handle, which only the pump
        // thread issues.
        let event = unsafe { sys::mpv_wait_event(self.ctx, timeout.as_secs_f64()) };
        if event.is_null() {
            return DecoderEvent::None;
        }
        // SAFETY: as above.
        let event = unsafe { &*event };
        match event.event_id {
            sys::MPV_EVENT_NONE => DecoderEvent::None,
            sys::MPV_EVENT_SHUTDOWN => DecoderEvent::Shutdown,
            sys::MPV_EVENT_LOG_MESSAGE => {
                if event.data.is_null() {
                    return DecoderEvent::None;
                }
                // SAFETY: for MPV_EVENT_LOG_MESSAGE the data pointer is an
                // mpv_event_log_message with the same lifetime as the event.
                let msg = unsafe { &*(event.data as *const sys::mpv_event_log_message) };
                if msg.prefix.is_null() || msg.text.is_null() {
                    return DecoderEvent::None;
                }
                // SAFETY: both strings are valid for the event lifetime and
                // copied out here.
                let (prefix, text) = unsafe {
                    (
                        CStr::from_ptr(msg.prefix).to_string_lossy().into_owned(),
                        CStr::from_ptr(msg.text).to_string_lossy().into_owned(),
                    )
                };
                DecoderEvent::Log(LogMessage {
                    level: LogLevel::from_raw(msg.log_level),
                    prefix,
                    text,
                })
            }
            _ => DecoderEvent::Other,
        }
    }
}

impl Drop for MpvHandle {
    fn drop(&mut self) {
        // SAFETY: ctx is live; terminate-destroy waits for decoder-internal
        // threads, so no stream callback can run afterwards.
        unsafe { sys::mpv_terminate_destroy(self.ctx) };
        for cookie in self.cookies.get_mut().drain(..) {
            // SAFETY: callbacks are quiesced; the leaked Box is reclaimed
            // exactly once.
            unsafe { drop(Box::from_raw(cookie)) };
        }
    }
}
