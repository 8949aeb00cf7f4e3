//! One part attempt: stream the range in a PUT, extract the ETag.
//!
//! Each attempt streams the range from the source afresh, so a retried part
//! never reuses bytes from an earlier attempt.

use crate::control::CancelToken;
use crate::retry::PartError;
use std::io;

use crate::source::{RangeBody, RangeReader};
use crate::transport::{PartTransport, PutResponse, TransportError};

/// What a worker needs to know about the part it is sending.
#[derive(Debug, Clone)]
pub struct PartJob {
    pub part_number: u32,
    pub url: String,
    pub offset: u64,
    pub size: u64,
    /// 1-based attempt counter for this part.
    pub attempt: u32,
}

/// Performs one attempt for `job`. Returns the unquoted ETag (empty when the
/// response carried none).
pub fn upload_one_part(
    transport: &dyn PartTransport,
    reader: &dyn RangeReader,
    job: &PartJob,
    cancel: &CancelToken,
) -> Result<String, PartError> {
    if cancel.is_cancelled() {
        return Err(PartError::Cancelled);
    }

    let mut body = RangeBody::new(reader, job.offset, job.size);
    let response = match transport.put(&job.url, &mut body, job.size, cancel) {
        Ok(response) => response,
        Err(TransportError::Body(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(PartError::ShortRead {
                expected: job.size,
                received: body.sent(),
            });
        }
        Err(e) => return Err(e.into()),
    };
    if cancel.is_cancelled() {
        return Err(PartError::Cancelled);
    }

    if !response.is_success() {
        return Err(PartError::Http(response.status));
    }

    let etag = parse_etag(&response);
    if etag.is_empty() {
        tracing::warn!(
            part = job.part_number,
            status = response.status,
            "part uploaded but response carried no ETag"
        );
    }
    Ok(etag)
}

/// ETag header value with surrounding quotes removed; empty if absent.
pub fn parse_etag(response: &PutResponse) -> String {
    response
        .header("etag")
        .map(|v| v.trim().trim_matches('"').to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::sync::Mutex;

    struct MemReader(Vec<u8>);

    impl RangeReader for MemReader {
        fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
            let start = (offset as usize).min(self.0.len());
            let end = (start + buf.len()).min(self.0.len());
            buf[..end - start].copy_from_slice(&self.0[start..end]);
            Ok(end - start)
        }
    }

    struct FixedTransport {
        response: Result<PutResponse, fn() -> TransportError>,
        seen: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl PartTransport for FixedTransport {
        fn put(
            &self,
            url: &str,
            body: &mut dyn Read,
            len: u64,
            _cancel: &CancelToken,
        ) -> Result<PutResponse, TransportError> {
            let mut sent = Vec::new();
            body.read_to_end(&mut sent).map_err(TransportError::Body)?;
            assert_eq!(sent.len() as u64, len);
            self.seen.lock().unwrap().push((url.to_string(), sent));
            match &self.response {
                Ok(r) => Ok(r.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    fn ok_with(headers: Vec<(&str, &str)>, status: u32) -> FixedTransport {
        FixedTransport {
            response: Ok(PutResponse {
                status,
                headers: headers
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            }),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn job(offset: u64, size: u64) -> PartJob {
        PartJob {
            part_number: 2,
            url: "https://bucket.example/part2?sig=x".into(),
            offset,
            size,
            attempt: 1,
        }
    }

    #[test]
    fn sends_exact_range_and_strips_quotes() {
        let reader = MemReader(b"0123456789".to_vec());
        let transport = ok_with(vec![("ETag", "\"abc123\"")], 200);
        let etag = upload_one_part(&transport, &reader, &job(3, 4), &CancelToken::new()).unwrap();
        assert_eq!(etag, "abc123");
        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].1, b"3456");
        assert_eq!(seen[0].0, "https://bucket.example/part2?sig=x");
    }

    #[test]
    fn missing_etag_is_not_a_failure() {
        let reader = MemReader(b"abcd".to_vec());
        let transport = ok_with(vec![], 204);
        let etag = upload_one_part(&transport, &reader, &job(0, 4), &CancelToken::new()).unwrap();
        assert_eq!(etag, "");
    }

    #[test]
    fn non_2xx_is_http_error() {
        let reader = MemReader(b"abcd".to_vec());
        let transport = ok_with(vec![("etag", "x")], 403);
        let err = upload_one_part(&transport, &reader, &job(0, 4), &CancelToken::new()).unwrap_err();
        assert!(matches!(err, PartError::Http(403)));
    }

    #[test]
    fn short_source_is_short_read() {
        let reader = MemReader(b"abc".to_vec());
        let transport = ok_with(vec![], 200);
        let err = upload_one_part(&transport, &reader, &job(0, 10), &CancelToken::new()).unwrap_err();
        assert!(matches!(
            err,
            PartError::ShortRead {
                expected: 10,
                received: 3
            }
        ));
        assert!(transport.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn transport_failure_propagates() {
        let reader = MemReader(b"abcd".to_vec());
        let transport = FixedTransport {
            response: Err(|| TransportError::Connection("reset".into())),
            seen: Mutex::new(Vec::new()),
        };
        let err = upload_one_part(&transport, &reader, &job(0, 4), &CancelToken::new()).unwrap_err();
        assert!(matches!(err, PartError::Transport(TransportError::Connection(_))));
    }

    #[test]
    fn cancelled_before_start_does_nothing() {
        let reader = MemReader(b"abcd".to_vec());
        let transport = ok_with(vec![], 200);
        let token = CancelToken::new();
        token.cancel();
        let err = upload_one_part(&transport, &reader, &job(0, 4), &token).unwrap_err();
        assert!(matches!(err, PartError::Cancelled));
        assert!(transport.seen.lock().unwrap().is_empty());
    }
}
