//! `multipart/form-data` encoding for single-file upload requests.

use crate::models::upload::FileHandle;
use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

/// An encoded request body together with its `Content-Type` header value.
pub struct EncodedForm {
    pub content_type: String,
    pub body: Bytes,
}

/// Encode `file` as the only part of a form, under `field`.
pub fn encode_file_form(field: &str, file: &FileHandle) -> EncodedForm {
    let boundary = format!("----gallery-{}", Uuid::new_v4().simple());
    let payload = file.bytes();

    let mut body = BytesMut::with_capacity(payload.len() + 256);
    body.put_slice(format!("--{boundary}\r\n").as_bytes());
    body.put_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            escape_quoted(field),
            escape_quoted(file.name())
        )
        .as_bytes(),
    );
    body.put_slice(format!("Content-Type: {}\r\n\r\n", file.mime_type()).as_bytes());
    body.put_slice(&payload);
    body.put_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    EncodedForm {
        content_type: format!("multipart/form-data; boundary={boundary}"),
        body: body.freeze(),
    }
}

/// Percent-encode the characters that would break a quoted header value,
/// matching what browsers send.
fn escape_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}
