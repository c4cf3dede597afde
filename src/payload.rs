use crate::error::DecodeError;


/// Separates the HTTP header section from the body.
pub const HEADER_DELIMITER: &[u8; 4] = b"\r\n\r\n";


/// Offset of the first byte after the first header delimiter.
pub fn payload_offset(stream: &[u8]) -> Result<usize, DecodeError> {
    stream.windows(HEADER_DELIMITER.len())
        .position(|w| w == HEADER_DELIMITER)
        .map(|p| p + HEADER_DELIMITER.len())
        .ok_or(DecodeError::PayloadNotFound { stream_length: stream.len() })
}


/// The bytes strictly after the first header delimiter.
pub fn extract_payload(stream: &[u8]) -> Result<&[u8], DecodeError> {
    let offset = payload_offset(stream)?;
    Ok(&stream[offset..])
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_after_headers() {
        let stream = b"HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\n\r\n\xff\xd8\xff\xe0";
        assert_eq!(extract_payload(stream).unwrap(), b"\xff\xd8\xff\xe0");
    }

    #[test]
    fn only_the_first_delimiter_counts() {
        let stream = b"A\r\n\r\nB\r\n\r\nC";
        assert_eq!(extract_payload(stream).unwrap(), b"B\r\n\r\nC");
        assert_eq!(payload_offset(stream).unwrap(), 5);
    }

    #[test]
    fn delimiter_at_the_end_gives_empty_payload() {
        let stream = b"HTTP/1.1 204 No Content\r\n\r\n";
        assert!(extract_payload(stream).unwrap().is_empty());
    }

    #[test]
    fn missing_delimiter() {
        let stream = b"HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\n";
        assert_eq!(extract_payload(stream).unwrap_err(), DecodeError::PayloadNotFound { stream_length: stream.len() });
        assert!(extract_payload(b"").is_err());
    }
}
