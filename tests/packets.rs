use netcodec::time::Instant;
use netcodec::wire::*;
use netcodec::{
    BuildError, Buffer, DataLinkKind, Layer, LinkDatagram, PacketBuilder, PayloadLayer,
    TrailerLayer,
};

fn ethernet() -> Layer {
    EthernetLayer {
        source: EthernetAddress([0x01; 6]),
        destination: Some(EthernetAddress([0x02; 6])),
        ether_type: None,
    }
    .into()
}

fn ipv4() -> Layer {
    Ipv4Layer {
        identification: 123,
        ttl: 100,
        source: Ipv4Address::new(1, 2, 3, 4),
        destination: Ipv4Address::new(11, 22, 33, 44),
        ..Ipv4Layer::default()
    }
    .into()
}

fn build(layers: Vec<Layer>) -> Buffer {
    PacketBuilder::new(layers)
        .build(Instant::from_secs(0))
        .expect("buildable stack")
}

/// Parse `buffer`, check it is valid, and rebuild it from the extracted layers.
fn assert_rebuilds(buffer: &Buffer) -> Vec<Layer> {
    let parsed = buffer.parse();
    assert!(parsed.is_valid());
    let layers = parsed.extract_layers();
    let rebuilt = build(layers.clone());
    assert_eq!(rebuilt.data(), buffer.data());
    assert_eq!(rebuilt.data_link(), buffer.data_link());
    layers
}

fn with_ipv4<R>(buffer: &Buffer, f: impl FnOnce(&Ipv4Datagram<'_>) -> R) -> R {
    match buffer.parse() {
        LinkDatagram::Ethernet(ethernet) => match ethernet.ether_payload() {
            EthernetPayload::Ipv4(ip) => f(ip),
            payload => panic!("unexpected payload {payload:?}"),
        },
        LinkDatagram::Ipv4(ip) => f(&ip),
        LinkDatagram::Ipv6(_) => panic!("not an IPv4 packet"),
    }
}

#[test]
fn ethernet_ipv4_udp() {
    let buffer = build(vec![
        ethernet(),
        ipv4(),
        UdpLayer {
            source_port: 4050,
            destination_port: 25,
            ..UdpLayer::default()
        }
        .into(),
        PayloadLayer::new(b"hello world".to_vec()).into(),
    ]);
    let data = buffer.data();
    assert_eq!(buffer.len(), 53);
    assert_eq!(&data[12..14], &[0x08, 0x00]);
    // total length, protocol
    assert_eq!(&data[16..18], &[0x00, 0x27]);
    assert_eq!(data[23], 17);
    // UDP length
    assert_eq!(&data[38..40], &[0x00, 0x13]);
    assert_eq!(&data[42..], b"hello world");

    with_ipv4(&buffer, |ip| {
        assert!(ip.verify_checksum());
        assert!(ip.is_transport_checksum_correct());
        match ip.ip_payload() {
            IpPayload::Udp(udp) => {
                assert_eq!(udp.src_port(), 4050);
                assert_eq!(udp.dst_port(), 25);
                assert_eq!(udp.payload_bytes(), b"hello world");
            }
            payload => panic!("unexpected payload {payload:?}"),
        }
    });

    let layers = assert_rebuilds(&buffer);
    assert_eq!(layers.len(), 4);
    assert!(matches!(layers[3], Layer::Payload(_)));
}

#[test]
fn corrupted_checksums_invalidate() {
    let buffer = build(vec![
        ethernet(),
        ipv4(),
        UdpLayer {
            source_port: 4050,
            destination_port: 25,
            ..UdpLayer::default()
        }
        .into(),
        PayloadLayer::new(b"hello world".to_vec()).into(),
    ]);

    let mut header = buffer.data().to_vec();
    header[24] ^= 0xff;
    let header = Buffer::new(header, buffer.timestamp(), DataLinkKind::Ethernet);
    assert!(!header.parse().is_valid());

    let mut payload = buffer.data().to_vec();
    payload[50] ^= 0x01;
    let payload = Buffer::new(payload, buffer.timestamp(), DataLinkKind::Ethernet);
    assert!(!payload.parse().is_valid());
}

#[test]
fn truncated_prefixes_never_validate() {
    let buffer = build(vec![
        ethernet(),
        ipv4(),
        UdpLayer::default().into(),
        PayloadLayer::new(b"hello world".to_vec()).into(),
    ]);
    for len in 0..buffer.len() {
        let prefix = Buffer::new(
            buffer.data()[..len].to_vec(),
            buffer.timestamp(),
            DataLinkKind::Ethernet,
        );
        let parsed = prefix.parse();
        assert!(!parsed.is_valid(), "prefix of {len} octets");
        let _ = parsed.extract_layers();
    }
}

#[test]
fn ipv4_udp_dns() {
    let query = DnsLayer {
        id: 0xbeef,
        flags: DnsFlags::RECURSION_DESIRED,
        questions: vec![DnsQuestion {
            name: "www.example.com".parse().unwrap(),
            record_type: DnsRecordType::Aaaa,
            class: 1,
        }],
        ..DnsLayer::default()
    };
    let buffer = build(vec![
        ipv4(),
        UdpLayer {
            source_port: 5353,
            destination_port: DNS_PORT,
            ..UdpLayer::default()
        }
        .into(),
        query.clone().into(),
    ]);
    assert_eq!(buffer.data_link(), DataLinkKind::Ipv4);

    with_ipv4(&buffer, |ip| match ip.ip_payload() {
        IpPayload::Udp(udp) => {
            let dns = udp.dns().expect("DNS port");
            assert!(dns.is_valid());
            assert_eq!(dns.questions(), &query.questions[..]);
        }
        payload => panic!("unexpected payload {payload:?}"),
    });

    let layers = assert_rebuilds(&buffer);
    assert_eq!(layers.last(), Some(&Layer::Dns(query)));
}

#[test]
fn ethernet_vlan_ipv4_tcp_http() {
    let options = Options::new(vec![
        TcpOption::MaximumSegmentSize(1460),
        TcpOption::SackPermitted,
        TcpOption::Timestamp {
            value: 0x01020304,
            echo_reply: 0,
        },
        TcpOption::Nop,
        TcpOption::WindowScale(7),
    ])
    .unwrap();
    let http = HttpLayer {
        start_line: HttpStartLine::Request {
            method: "GET".into(),
            uri: "/".into(),
            version: HttpVersion::HTTP_1_1,
        },
        fields: vec![HttpField::new("Host", "example.com")],
        body: Vec::new(),
    };
    let buffer = build(vec![
        ethernet(),
        VlanLayer {
            priority: 3,
            vlan_id: 42,
            ..VlanLayer::default()
        }
        .into(),
        ipv4(),
        TcpLayer {
            source_port: 49152,
            destination_port: HTTP_PORT,
            sequence_number: 1,
            control: TcpControl::PSH | TcpControl::ACK,
            window: 512,
            options: options.clone(),
            ..TcpLayer::default()
        }
        .into(),
        http.clone().into(),
    ]);

    let layers = assert_rebuilds(&buffer);
    assert_eq!(layers.len(), 5);
    match &layers[3] {
        Layer::Tcp(tcp) => assert_eq!(tcp.options.as_slice(), options.as_slice()),
        layer => panic!("unexpected layer {layer:?}"),
    }
    assert_eq!(layers[4], Layer::Http(http));
}

#[test]
fn ipv4_icmp_unknown_type_is_preserved() {
    let message = IcmpMessage::Unknown {
        kind: 200,
        rest_of_header: 0xdeadbeef,
        data: vec![1, 2, 3, 4, 5],
    };
    let buffer = build(vec![
        ipv4(),
        IcmpLayer {
            code: 9,
            checksum: None,
            message: message.clone(),
        }
        .into(),
    ]);

    with_ipv4(&buffer, |ip| match ip.ip_payload() {
        IpPayload::Icmp(icmp) => {
            assert!(icmp.is_valid());
            assert_eq!(icmp.message(), message);
        }
        payload => panic!("unexpected payload {payload:?}"),
    });
    assert_rebuilds(&buffer);
}

#[test]
fn ipv4_gre_ipv4_udp() {
    let buffer = build(vec![
        ethernet(),
        ipv4(),
        GreLayer {
            checksum_present: true,
            key: Some(0x0102),
            sequence_number: Some(7),
            ..GreLayer::default()
        }
        .into(),
        Ipv4Layer {
            source: Ipv4Address::new(10, 0, 0, 1),
            destination: Ipv4Address::new(10, 0, 0, 2),
            ..Ipv4Layer::default()
        }
        .into(),
        UdpLayer {
            source_port: 1000,
            destination_port: 2000,
            ..UdpLayer::default()
        }
        .into(),
        PayloadLayer::new(vec![0xaa; 16]).into(),
    ]);

    with_ipv4(&buffer, |ip| {
        assert_eq!(ip.next_header(), IpProtocol::Gre);
        match ip.ip_payload() {
            IpPayload::Gre(gre) => {
                assert!(gre.is_valid());
                assert_eq!(gre.protocol_type(), EtherType::Ipv4);
                assert!(gre.verify_checksum());
            }
            payload => panic!("unexpected payload {payload:?}"),
        }
    });
    let layers = assert_rebuilds(&buffer);
    assert_eq!(layers.len(), 6);
}

#[test]
fn dhcp_discover_over_udp() {
    let mut dhcp = DhcpLayer {
        transaction_id: 0x3903f326,
        flags: DhcpFlags::BROADCAST,
        options: Options::new(vec![
            DhcpOption::MessageType(DhcpMessageType::Discover),
            DhcpOption::ParameterRequestList(vec![
                DhcpOptionCode::SubnetMask,
                DhcpOptionCode::Router,
                DhcpOptionCode::DomainNameServer,
            ]),
            DhcpOption::End,
        ])
        .unwrap(),
        ..DhcpLayer::default()
    };
    dhcp.set_client_mac(EthernetAddress([0x00, 0x0b, 0x82, 0x01, 0xfc, 0x42]));

    let buffer = build(vec![
        EthernetLayer {
            source: EthernetAddress([0x00, 0x0b, 0x82, 0x01, 0xfc, 0x42]),
            destination: Some(EthernetAddress::BROADCAST),
            ether_type: None,
        }
        .into(),
        Ipv4Layer {
            destination: Ipv4Address::BROADCAST,
            ..Ipv4Layer::default()
        }
        .into(),
        UdpLayer {
            source_port: DHCP_CLIENT_PORT,
            destination_port: DHCP_SERVER_PORT,
            ..UdpLayer::default()
        }
        .into(),
        dhcp.clone().into(),
    ]);

    with_ipv4(&buffer, |ip| match ip.ip_payload() {
        IpPayload::Udp(udp) => {
            let view = udp.dhcp().expect("DHCP ports");
            assert!(view.is_valid());
            assert_eq!(view.transaction_id(), 0x3903f326);
            assert_eq!(view.message_type(), Some(DhcpMessageType::Discover));
        }
        payload => panic!("unexpected payload {payload:?}"),
    });
    let layers = assert_rebuilds(&buffer);
    assert_eq!(layers.last(), Some(&Layer::Dhcp(dhcp)));
}

#[test]
fn oversized_option_area_is_rejected() {
    let options = Options::<Ipv4Option>::new(vec![Ipv4Option::Unknown {
        kind: 0x99,
        data: vec![0; 40],
    }]);
    assert!(matches!(options, Err(BuildError::TooLong { .. })));
}

#[test]
fn empty_stack_is_rejected() {
    assert_eq!(
        PacketBuilder::new(Vec::new()).build(Instant::from_secs(0)),
        Err(BuildError::EmptyStack)
    );
}

fn captured(data: Vec<u8>) -> Buffer {
    Buffer::new(data, Instant::from_secs(0), DataLinkKind::Ethernet)
}

fn ethernet_ipv4_tcp() -> Buffer {
    build(vec![
        ethernet(),
        ipv4(),
        TcpLayer {
            source_port: 49152,
            destination_port: 443,
            control: TcpControl::ACK,
            window: 512,
            ..TcpLayer::default()
        }
        .into(),
    ])
}

#[test]
fn minimum_frame_padding_is_kept() {
    let buffer = ethernet_ipv4_tcp();
    assert_eq!(buffer.len(), 54);
    let mut data = buffer.data().to_vec();
    data.resize(60, 0);
    let padded = captured(data);

    match padded.parse() {
        LinkDatagram::Ethernet(frame) => {
            assert_eq!(frame.extra_data(), Some(&[0u8; 6][..]));
            assert_eq!(frame.padding(), Some(&[0u8; 6][..]));
            assert_eq!(frame.trailer(), Some(&[][..]));
            assert_eq!(frame.frame_check_sequence(), None);
        }
        datagram => panic!("unexpected datagram {datagram:?}"),
    }

    let layers = assert_rebuilds(&padded);
    assert_eq!(layers.len(), 4);
    assert_eq!(layers[3], Layer::Trailer(TrailerLayer::new(vec![0; 6])));
}

#[test]
fn trailer_and_frame_check_sequence_are_kept() {
    let mut data = ethernet_ipv4_tcp().data().to_vec();
    data.extend_from_slice(&[0; 6]);
    data.extend_from_slice(&[0x7e, 0x7f]);
    data.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
    let buffer = captured(data);

    match buffer.parse() {
        LinkDatagram::Ethernet(frame) => {
            assert_eq!(frame.padding(), Some(&[0u8; 6][..]));
            assert_eq!(frame.trailer(), Some(&[0x7e, 0x7f][..]));
            assert_eq!(frame.frame_check_sequence(), Some(&[0xde, 0xad, 0xbe, 0xef][..]));
        }
        datagram => panic!("unexpected datagram {datagram:?}"),
    }
    assert_rebuilds(&buffer);
}

#[test]
fn undeclared_payload_has_no_trailer() {
    let buffer = build(vec![
        EthernetLayer {
            ether_type: Some(EtherType::Unknown(0x88b5)),
            ..EthernetLayer::default()
        }
        .into(),
        PayloadLayer::new(vec![0x55; 50]).into(),
    ]);
    match buffer.parse() {
        LinkDatagram::Ethernet(frame) => assert_eq!(frame.extra_data(), None),
        datagram => panic!("unexpected datagram {datagram:?}"),
    }
    let layers = assert_rebuilds(&buffer);
    assert!(matches!(layers.last(), Some(Layer::Payload(_))));
}

#[test]
fn ipv4_esp_keeps_ciphertext_opaque() {
    let buffer = build(vec![
        ipv4(),
        EspLayer {
            security_parameters_index: 0x0000_1001,
            sequence_number: 7,
        }
        .into(),
        PayloadLayer::new(vec![0x5a; 24]).into(),
    ]);

    with_ipv4(&buffer, |ip| {
        assert_eq!(ip.next_header(), IpProtocol::IpSecEsp);
        match ip.ip_payload() {
            IpPayload::Esp(esp) => {
                assert!(esp.is_valid());
                assert_eq!(esp.security_parameters_index(), 0x1001);
                assert_eq!(esp.sequence_number(), 7);
                assert_eq!(esp.payload_bytes(), &[0x5a; 24][..]);
            }
            payload => panic!("unexpected payload {payload:?}"),
        }
    });
    let layers = assert_rebuilds(&buffer);
    assert_eq!(layers.len(), 3);
    assert!(matches!(layers[1], Layer::Esp(_)));
}
