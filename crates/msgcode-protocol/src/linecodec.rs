use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// One JSON value per line, newline-delimited. Shared by the Transport
/// Adapter (subprocess RPC to the messaging transport binary) and the
/// Session Pool (subprocess RPC to client-kind backends) — both frame a
/// request as one line out, one line back.
#[derive(Debug, Default)]
pub struct LineCodec {
    next_index: usize,
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> std::io::Result<Option<String>> {
        if let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') {
            let newline_index = self.next_index + offset;
            let line = src.split_to(newline_index + 1);
            self.next_index = 0;
            let line = &line[..line.len() - 1];
            let line = if line.last() == Some(&b'\r') {
                &line[..line.len() - 1]
            } else {
                line
            };
            let line = std::str::from_utf8(line)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?
                .to_string();
            Ok(Some(line))
        } else {
            self.next_index = src.len();
            Ok(None)
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> std::io::Result<Option<String>> {
        match self.decode(src)? {
            Some(line) => Ok(Some(line)),
            None if src.is_empty() => Ok(None),
            None => {
                let line = src.split_to(src.len());
                self.next_index = 0;
                let line = std::str::from_utf8(&line)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?
                    .to_string();
                Ok(Some(line))
            }
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> std::io::Result<()> {
        dst.reserve(item.len() + 1);
        dst.extend_from_slice(item.as_bytes());
        dst.extend_from_slice(b"\n");
        Ok(())
    }
}

/// One outbound RPC frame on a `LineCodec` channel: `{id, op, args}`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RpcRequest {
    pub id: String,
    pub op: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// The matching inbound frame: `{id, ok, data?, error?}`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RpcResponse {
    pub id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorShape>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RpcErrorShape {
    pub code: String,
    pub message: String,
}

impl RpcRequest {
    pub fn new(op: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            op: op.into(),
            args,
        }
    }

    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl RpcResponse {
    pub fn from_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn decodes_single_line() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from("{\"id\":\"1\"}\n");
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(line, "{\"id\":\"1\"}");
        assert!(buf.is_empty());
    }

    #[test]
    fn buffers_partial_line() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from("{\"id\":");
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"\"1\"}\n");
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(line, "{\"id\":\"1\"}");
    }

    #[test]
    fn request_response_roundtrip() {
        let req = RpcRequest::new("list", serde_json::json!({"since": 0}));
        let line = req.to_line().unwrap();
        let res = RpcResponse::from_line(&format!(
            "{{\"id\":\"{}\",\"ok\":true,\"data\":{{}}}}",
            req.id
        ))
        .unwrap();
        assert_eq!(res.id, req.id);
        assert!(res.ok);
        assert!(!line.is_empty());
    }
}
