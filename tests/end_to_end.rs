use bytes::Bytes;
use pretty_assertions::assert_eq;
use rtspipe::config::{MuxConfig, SessionConfig, SinkConfig};
use rtspipe::format::depay::BasicDepacketizer;
use rtspipe::format::mp4::{find_box, Mp4Muxer};
use rtspipe::format::rtcp::RTCPPacket;
use rtspipe::format::rtp::RTPPacket;
use rtspipe::format::rtsp::session::interleave;
use rtspipe::format::rtsp::{RtspClient, RtspSession, SessionState, StreamTransport};
use rtspipe::pipeline::SegmentKind;
use rtspipe::sink::{BufferedSink, SinkComponent};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

const SSRC: u32 = 0xCAFE;
const SDP: &str = "v=0\r\n\
o=- 1 1 IN IP4 10.0.0.2\r\n\
s=Door camera\r\n\
t=0 0\r\n\
a=control:*\r\n\
m=audio 0 RTP/AVP 0\r\n\
a=rtpmap:0 PCMU/8000\r\n\
a=control:trackID=0\r\n";

async fn read_request(io: &mut DuplexStream) -> String {
    let mut data = Vec::new();
    let mut byte = [0u8; 1];
    while !data.ends_with(b"\r\n\r\n") {
        if io.read(&mut byte).await.unwrap() == 0 {
            break;
        }
        data.push(byte[0]);
    }
    String::from_utf8(data).unwrap()
}

async fn reply(io: &mut DuplexStream, request: &str, headers: &str, body: &str) {
    let cseq = request
        .lines()
        .find_map(|l| l.strip_prefix("CSeq: "))
        .unwrap()
        .trim()
        .to_string();
    let mut wire = format!("RTSP/1.0 200 OK\r\nCSeq: {}\r\n{}", cseq, headers);
    if !body.is_empty() {
        wire.push_str(&format!(
            "Content-Type: application/sdp\r\nContent-Length: {}\r\n",
            body.len()
        ));
    }
    wire.push_str("\r\n");
    wire.push_str(body);
    io.write_all(wire.as_bytes()).await.unwrap();
}

/// Camera that serves one G.711 track, sends three frames and says goodbye.
async fn camera(mut io: DuplexStream) -> Vec<String> {
    let mut methods = Vec::new();

    let options = read_request(&mut io).await;
    reply(&mut io, &options, "Public: OPTIONS, DESCRIBE, SETUP, PLAY, TEARDOWN\r\n", "").await;
    let describe = read_request(&mut io).await;
    reply(&mut io, &describe, "Content-Base: rtsp://camera.local/audio/\r\n", SDP).await;
    let setup = read_request(&mut io).await;
    assert!(setup.contains("interleaved=0-1"), "{}", setup);
    reply(
        &mut io,
        &setup,
        "Session: 7F3A;timeout=60\r\nTransport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n",
        "",
    )
    .await;
    let play = read_request(&mut io).await;
    reply(
        &mut io,
        &play,
        "Session: 7F3A\r\nRTP-Info: url=trackID=0;seq=100;rtptime=8000\r\n",
        "",
    )
    .await;

    for i in 0..3u16 {
        let payload = Bytes::from(vec![i as u8 + 1; 160]);
        let packet = RTPPacket::new(0, 100 + i, 8000 + i as u32 * 160, SSRC, false, payload);
        io.write_all(&interleave(0, &packet.to_bytes())).await.unwrap();
    }
    let bye = RTCPPacket::Goodbye {
        sources: vec![SSRC],
        reason: Some("done".into()),
    };
    io.write_all(&interleave(1, &bye.to_bytes())).await.unwrap();

    let teardown = read_request(&mut io).await;
    reply(&mut io, &teardown, "Session: 7F3A\r\n", "").await;

    for request in [options, describe, setup, play, teardown] {
        methods.push(request.split(' ').next().unwrap_or_default().to_string());
    }
    methods
}

#[tokio::test]
async fn test_rtsp_to_fragmented_mp4() {
    let (client_io, server_io) = tokio::io::duplex(16 * 1024);
    let server = tokio::spawn(camera(server_io));

    let buffer = BufferedSink::new(SinkConfig::default());
    let session = RtspSession::new("rtsp://camera.local/audio", SessionConfig::default()).unwrap();
    let mut client = RtspClient::new(StreamTransport::new(client_io), session)
        .then(BasicDepacketizer::for_encoding("PCMU"))
        .then(Mp4Muxer::new(MuxConfig::default()))
        .then(SinkComponent::new(buffer.clone()));

    client.run().await.unwrap();
    assert_eq!(client.state(), SessionState::Closed);
    assert_eq!(
        server.await.unwrap(),
        vec!["OPTIONS", "DESCRIBE", "SETUP", "PLAY", "TEARDOWN"]
    );

    let init = buffer.init_segment().expect("init segment");
    assert_eq!(init.kind, SegmentKind::Init);
    assert_eq!(init.mime_type.as_deref(), Some("audio/mp4; codecs=\"ulaw\""));
    assert!(find_box(&init.data, &[b"moov", b"mvex", b"trex"]).is_some());

    let fragments = buffer.segments();
    assert_eq!(fragments.len(), 1);
    let fragment = &fragments[0];
    assert_eq!(fragment.kind, SegmentKind::Fragment);
    assert_eq!(fragment.sample_count, 3);
    assert_eq!(fragment.base_decode_time, 0);
    assert_eq!(fragment.duration, 480);

    let mdat = find_box(&fragment.data, &[b"mdat"]).unwrap();
    assert_eq!(mdat.len(), 8 + 3 * 160);
    assert_eq!((mdat[8], mdat[8 + 160], mdat[8 + 320]), (1, 2, 3));
    assert!(buffer.is_ended());
}
