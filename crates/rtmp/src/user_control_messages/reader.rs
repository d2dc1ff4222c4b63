//! Reading [`UserControlEvent`].

use std::io::{self, Cursor};

use byteorder::{BigEndian, ReadBytesExt};
use bytes::Bytes;

use super::{EventType, UserControlEvent};

impl UserControlEvent {
    /// Reads a [`UserControlEvent`] from a user control message's payload.
    pub fn read(data: &Bytes) -> io::Result<Self> {
        let mut cursor = Cursor::new(&data[..]);
        let event_type = EventType(cursor.read_u16::<BigEndian>()?);

        match event_type {
            EventType::SetBufferLength => {
                let stream_id = cursor.read_u32::<BigEndian>()?;
                let buffer_length = cursor.read_u32::<BigEndian>()?;
                Ok(Self::SetBufferLength { stream_id, buffer_length })
            }
            EventType::PingRequest => {
                let timestamp = cursor.read_u32::<BigEndian>()?;
                Ok(Self::PingRequest { timestamp })
            }
            EventType::PingResponse => {
                let timestamp = cursor.read_u32::<BigEndian>()?;
                Ok(Self::PingResponse { timestamp })
            }
            event_type => Ok(Self::Unknown {
                event_type,
                data: data.slice(2..),
            }),
        }
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn reads_ping_response() {
        let data = Bytes::from(vec![0x00, 0x07, 0x00, 0x00, 0x01, 0x02]);
        let event = UserControlEvent::read(&data).unwrap();
        assert_eq!(event, UserControlEvent::PingResponse { timestamp: 0x0102 });
    }

    #[test]
    fn reads_ping_request() {
        let data = Bytes::from(vec![0x00, 0x06, 0x00, 0x00, 0x01, 0x02]);
        let event = UserControlEvent::read(&data).unwrap();
        assert_eq!(event, UserControlEvent::PingRequest { timestamp: 0x0102 });
    }

    #[test]
    fn reads_set_buffer_length() {
        let data = Bytes::from(vec![0x00, 0x03, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x03, 0xE8]);
        let event = UserControlEvent::read(&data).unwrap();
        assert_eq!(
            event,
            UserControlEvent::SetBufferLength {
                stream_id: 1,
                buffer_length: 1000
            }
        );
    }

    #[test]
    fn reads_unknown_event() {
        let data = Bytes::from(vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x05]);
        let event = UserControlEvent::read(&data).unwrap();
        assert_eq!(
            event,
            UserControlEvent::Unknown {
                event_type: EventType::StreamEOF,
                data: Bytes::from(vec![0x00, 0x00, 0x00, 0x05]),
            }
        );
    }
}
