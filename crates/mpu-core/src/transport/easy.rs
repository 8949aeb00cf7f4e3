//! libcurl-backed PUT transport (one Easy handle per attempt).

use std::io::{self, Read};
use std::time::Duration;

use curl::easy::ReadError;

use crate::control::CancelToken;

use super::{parse_header_line, PartTransport, PutResponse, TransportError};

/// Timeouts applied to each PUT.
#[derive(Debug, Clone, Copy)]
pub struct CurlOptions {
    pub connect_timeout: Duration,
    /// Hard wall-clock bound for one attempt.
    pub request_timeout: Duration,
    /// Abort if throughput stays below `low_speed_limit` bytes/s for `low_speed_time`.
    pub low_speed_limit: u32,
    pub low_speed_time: Duration,
}

impl Default for CurlOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(600),
            low_speed_limit: 1024,
            low_speed_time: Duration::from_secs(60),
        }
    }
}

/// Sends part bodies with libcurl. Cheap to share: each `put` builds its own handle.
#[derive(Debug, Clone, Default)]
pub struct CurlTransport {
    opts: CurlOptions,
}

impl CurlTransport {
    pub fn new(opts: CurlOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &CurlOptions {
        &self.opts
    }
}

impl PartTransport for CurlTransport {
    fn put(
        &self,
        url: &str,
        body: &mut dyn Read,
        len: u64,
        cancel: &CancelToken,
    ) -> Result<PutResponse, TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Aborted);
        }

        let mut easy = curl::easy::Easy::new();
        easy.url(url).map_err(map_curl_error)?;
        easy.upload(true).map_err(map_curl_error)?;
        easy.in_filesize(len).map_err(map_curl_error)?;
        easy.connect_timeout(self.opts.connect_timeout)
            .map_err(map_curl_error)?;
        easy.timeout(self.opts.request_timeout)
            .map_err(map_curl_error)?;
        easy.low_speed_limit(self.opts.low_speed_limit)
            .map_err(map_curl_error)?;
        easy.low_speed_time(self.opts.low_speed_time)
            .map_err(map_curl_error)?;
        easy.progress(true).map_err(map_curl_error)?;

        // Presigned URLs sign the exact header set; send nothing extra and
        // suppress curl's default `Expect: 100-continue`.
        let mut list = curl::easy::List::new();
        list.append("Expect:").map_err(map_curl_error)?;
        easy.http_headers(list).map_err(map_curl_error)?;

        let mut body_error: Option<io::Error> = None;
        let mut headers = Vec::new();
        let performed = {
            let mut transfer = easy.transfer();
            transfer
                .read_function(|buf| match body.read(buf) {
                    Ok(n) => Ok(n),
                    Err(e) => {
                        body_error = Some(e);
                        Err(ReadError::Abort)
                    }
                })
                .map_err(map_curl_error)?;
            transfer
                .header_function(|line| {
                    if let Ok(s) = std::str::from_utf8(line) {
                        if s.starts_with("HTTP/") {
                            // New response (redirect or interim); keep only the last.
                            headers.clear();
                        } else if let Some(pair) = parse_header_line(s) {
                            headers.push(pair);
                        }
                    }
                    true
                })
                .map_err(map_curl_error)?;
            transfer
                .write_function(|data| Ok(data.len()))
                .map_err(map_curl_error)?;
            transfer
                .progress_function(|_, _, _, _| !cancel.is_cancelled())
                .map_err(map_curl_error)?;
            transfer.perform()
        };
        if let Some(e) = body_error {
            return Err(TransportError::Body(e));
        }
        performed.map_err(map_curl_error)?;

        let status = easy.response_code().map_err(map_curl_error)?;
        Ok(PutResponse { status, headers })
    }
}

/// Maps a curl error onto the transport taxonomy.
fn map_curl_error(e: curl::Error) -> TransportError {
    if e.is_aborted_by_callback() {
        return TransportError::Aborted;
    }
    if e.is_operation_timedout() {
        return TransportError::Timeout(e.to_string());
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
    {
        return TransportError::Connection(e.to_string());
    }
    TransportError::Other(e.to_string())
}
