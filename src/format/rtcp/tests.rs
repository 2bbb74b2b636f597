use super::*;
use pretty_assertions::assert_eq;

const SENDER_REPORT: [u8; 28] = [
    0x80, 0xc8, 0x00, 0x06, // V=2, P=0, Count=0, Type=SR(200), Len=6
    0x12, 0x34, 0x56, 0x78, // SSRC
    0xdf, 0xa0, 0x00, 0x00, // NTP timestamp (MSW)
    0x80, 0x00, 0x00, 0x00, // NTP timestamp (LSW), half a second
    0x00, 0x01, 0x86, 0xa0, // RTP timestamp (100000)
    0x00, 0x00, 0x00, 0x0a, // Packet count (10)
    0x00, 0x00, 0x0b, 0xb8, // Octet count (3000)
];

#[test]
fn test_sender_report_parse() {
    match RTCPPacket::parse(&SENDER_REPORT).unwrap() {
        RTCPPacket::SenderReport {
            ssrc,
            ntp_timestamp,
            rtp_timestamp,
            packet_count,
            octet_count,
            reports,
        } => {
            assert_eq!(ssrc, 0x12345678);
            assert_eq!(ntp_timestamp, 0xdfa00000_80000000);
            assert_eq!(ntp_to_millis(ntp_timestamp), 0xdfa00000u64 * 1000 + 500);
            assert_eq!(rtp_timestamp, 100000);
            assert_eq!(packet_count, 10);
            assert_eq!(octet_count, 3000);
            assert!(reports.is_empty());
        }
        other => panic!("Expected SenderReport, got {:?}", other),
    }
}

#[test]
fn test_receiver_report_parse() {
    let data = [
        0x81, 0xc9, 0x00, 0x07, // V=2, P=0, Count=1, Type=RR(201), Len=7
        0x12, 0x34, 0x56, 0x78, // SSRC of packet sender
        0x11, 0x11, 0x11, 0x11, // SSRC_1 (source 1)
        0x20, 0x00, 0x00, 0x01, // fraction lost + cumulative lost
        0x00, 0x00, 0x03, 0xe8, // extended highest seq number
        0x00, 0x00, 0x00, 0x64, // interarrival jitter
        0x12, 0x34, 0x56, 0x78, // LSR
        0x00, 0x00, 0x00, 0x0a, // DLSR
    ];

    let packet = RTCPPacket::parse(&data).unwrap();
    let RTCPPacket::ReceiverReport { ssrc, reports } = &packet else {
        panic!("Expected ReceiverReport");
    };
    assert_eq!(*ssrc, 0x12345678);
    assert_eq!(
        reports[0],
        ReceptionReport {
            ssrc: 0x11111111,
            fraction_lost: 0x20,
            packets_lost: 1,
            highest_seq: 1000,
            jitter: 100,
            last_sr: 0x12345678,
            delay_last_sr: 10,
        }
    );
    assert_eq!(&packet.to_bytes()[..], &data[..]);
}

#[test]
fn test_compound_sr_sdes_bye() {
    let sdes = RTCPPacket::SourceDescription {
        chunks: vec![(0x12345678, vec![(1, "camera@host".to_string())])],
    };
    let bye = RTCPPacket::Goodbye {
        sources: vec![0x12345678],
        reason: Some("shutdown".to_string()),
    };

    let mut compound = SENDER_REPORT.to_vec();
    compound.extend_from_slice(&sdes.to_bytes());
    compound.extend_from_slice(&bye.to_bytes());

    let packets = RTCPPacket::parse_compound(&compound).unwrap();
    assert_eq!(packets.len(), 3);
    assert_eq!(packets[0].packet_type(), PacketType::SenderReport);
    assert_eq!(packets[1], sdes);
    assert_eq!(packets[2], bye);
    assert_eq!(peek_packet_type(&compound), Some(PacketType::SenderReport));
}

#[test]
fn test_bye_without_reason() {
    let data = [0x81, 0xcb, 0x00, 0x01, 0xde, 0xad, 0xbe, 0xef];
    assert_eq!(
        RTCPPacket::parse(&data).unwrap(),
        RTCPPacket::Goodbye {
            sources: vec![0xdeadbeef],
            reason: None
        }
    );
    assert_eq!(peek_packet_type(&data), Some(PacketType::Goodbye));
}

#[test]
fn test_compound_skips_unknown_types() {
    let mut data = vec![0x80, 0xcf, 0x00, 0x01, 0, 0, 0, 0]; // type 207 (XR)
    data.extend_from_slice(&[0x81, 0xcb, 0x00, 0x01, 0, 0, 0, 9]);
    let packets = RTCPPacket::parse_compound(&data).unwrap();
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].packet_type(), PacketType::Goodbye);
}

#[test]
fn test_ntp_timestamp() {
    let ts = get_ntp_timestamp();
    let jan_2020_ntp = 3_786_825_600u64 << 32;
    assert!(ts > jan_2020_ntp);
    assert_eq!(ntp_middle(0x1122_3344_5566_7788), 0x3344_5566);
}

#[test]
fn test_invalid_rtcp_packet() {
    assert!(matches!(
        RTCPPacket::parse(&[0x80, 0xc8, 0x00]),
        Err(RTCPError::InvalidPacket(_))
    ));
    assert!(matches!(
        RTCPPacket::parse(&[0x40, 0xc8, 0x00, 0x01, 0, 0, 0, 0]),
        Err(RTCPError::InvalidPacket(_))
    ));
    assert_eq!(
        RTCPPacket::parse(&[0x80, 0xff, 0x00, 0x01, 0, 0, 0, 0]),
        Err(RTCPError::UnsupportedType(255))
    );
    // Length field claims more than is present
    assert!(RTCPPacket::parse_compound(&[0x80, 0xc9, 0x00, 0x06, 0, 0, 0, 1]).is_err());
    assert_eq!(peek_packet_type(&[0x80, 0xff, 0, 0]), None);
}
