use bytes::Bytes;
use std::fmt;

/// RTSP methods issued by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// OPTIONS
    Options,
    /// DESCRIBE
    Describe,
    /// SETUP
    Setup,
    /// PLAY
    Play,
    /// PAUSE
    Pause,
    /// TEARDOWN
    Teardown,
    /// GET_PARAMETER
    GetParameter,
}

impl Method {
    /// The method name on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::Describe => "DESCRIBE",
            Method::Setup => "SETUP",
            Method::Play => "PLAY",
            Method::Pause => "PAUSE",
            Method::Teardown => "TEARDOWN",
            Method::GetParameter => "GET_PARAMETER",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outbound RTSP request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Method
    pub method: Method,
    /// Request URI
    pub uri: String,
    /// Sequence number
    pub cseq: u32,
    /// Headers other than `CSeq`, in order
    pub headers: Vec<(String, String)>,
}

impl Request {
    /// A request with no headers.
    pub fn new(method: Method, uri: &str, cseq: u32) -> Self {
        Self {
            method,
            uri: uri.to_string(),
            cseq,
            headers: Vec::new(),
        }
    }

    /// Appends a header, builder style.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// First header named `name`, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Serializes the request line, `CSeq` and headers; requests carry no body.
    pub fn to_bytes(&self) -> Bytes {
        let mut request = format!("{} {} RTSP/1.0\r\n", self.method, self.uri);
        request.push_str(&format!("CSeq: {}\r\n", self.cseq));
        for (name, value) in &self.headers {
            request.push_str(&format!("{}: {}\r\n", name, value));
        }
        request.push_str("\r\n");
        Bytes::from(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_building() {
        let request = Request::new(Method::Describe, "rtsp://example.com/stream", 1)
            .with_header("Accept", "application/sdp");

        let wire = String::from_utf8(request.to_bytes().to_vec()).unwrap();
        assert!(wire.starts_with("DESCRIBE rtsp://example.com/stream RTSP/1.0\r\n"));
        assert!(wire.contains("CSeq: 1\r\n"));
        assert!(wire.contains("Accept: application/sdp\r\n"));
        assert!(wire.ends_with("\r\n\r\n"));
        assert_eq!(request.header("accept"), Some("application/sdp"));
    }

    #[test]
    fn test_method_names() {
        assert_eq!(Method::GetParameter.to_string(), "GET_PARAMETER");
        assert_eq!(Method::Teardown.as_str(), "TEARDOWN");
    }
}
