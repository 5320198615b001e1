//! Property tests for framed message transport.

use avro_rpc::framing::{decode_framed, encode_framed};
use avro_rpc::{FramingConfig, FramingError, read_framed_message, write_framed_message};
use proptest::prelude::*;

fn config(frame_size: usize) -> FramingConfig {
    FramingConfig {
        frame_size,
        ..FramingConfig::default()
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    /// Whatever is written is read back unchanged, the empty payload included.
    #[test]
    fn prop_stream_round_trip(
        payload in prop::collection::vec(any::<u8>(), 0..4096),
        frame_size in 1..512usize,
    ) {
        let config = config(frame_size);
        let read = runtime().block_on(async {
            let mut wire = Vec::new();
            write_framed_message(&mut wire, &payload, &config).await.unwrap();
            read_framed_message(&mut wire.as_slice(), &config).await.unwrap()
        });
        prop_assert_eq!(&read[..], &payload[..]);
    }

    /// Every frame but the terminator carries between 1 and `frame_size` bytes.
    #[test]
    fn prop_frame_sizes_bounded(
        payload in prop::collection::vec(any::<u8>(), 0..2048),
        frame_size in 1..256usize,
    ) {
        let framed = encode_framed(&payload, &config(frame_size));
        let mut rest = &framed[..];
        let mut total = 0;
        loop {
            let len = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
            rest = &rest[4..];
            if len == 0 {
                break;
            }
            prop_assert!(len <= frame_size);
            total += len;
            rest = &rest[len..];
        }
        prop_assert!(rest.is_empty());
        prop_assert_eq!(total, payload.len());
    }

    /// Any strict prefix of a framed message is rejected rather than read as
    /// a shorter payload.
    #[test]
    fn prop_truncated_stream_is_connection_closed(
        payload in prop::collection::vec(any::<u8>(), 0..1024),
        cut in any::<prop::sample::Index>(),
    ) {
        let config = FramingConfig::default();
        let framed = encode_framed(&payload, &config);
        let prefix = &framed[..cut.index(framed.len())];

        let result = runtime().block_on(async {
            let mut reader = prefix;
            read_framed_message(&mut reader, &config).await
        });
        prop_assert!(matches!(result, Err(FramingError::ConnectionClosed)));
        prop_assert!(matches!(
            decode_framed(prefix, &config),
            Err(FramingError::ConnectionClosed)
        ));
    }
}
