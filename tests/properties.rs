use netcodec::time::Instant;
use netcodec::wire::*;
use netcodec::{Buffer, DataLinkKind, Layer, PacketBuilder, PayloadLayer};
use proptest::prelude::*;

fn data_link() -> impl Strategy<Value = DataLinkKind> {
    prop_oneof![
        Just(DataLinkKind::Ethernet),
        Just(DataLinkKind::Ipv4),
        Just(DataLinkKind::Ipv6),
    ]
}

fn ipv4_address() -> impl Strategy<Value = Ipv4Address> {
    any::<[u8; 4]>().prop_map(Ipv4Address::from)
}

fn build(layers: Vec<Layer>) -> Buffer {
    PacketBuilder::new(layers)
        .build(Instant::from_secs(0))
        .expect("buildable stack")
}

fn ipv4_layer(source: Ipv4Address, destination: Ipv4Address) -> Layer {
    Ipv4Layer {
        source,
        destination,
        ..Ipv4Layer::default()
    }
    .into()
}

fn tcp_layer(options: Vec<TcpOption>) -> Layer {
    TcpLayer {
        source_port: 1234,
        destination_port: 4321,
        control: TcpControl::SYN,
        window: 1024,
        options: Options::new(options).expect("options fit"),
        ..TcpLayer::default()
    }
    .into()
}

proptest! {
    #[test]
    fn arbitrary_octets_never_panic(
        kind in data_link(),
        data in proptest::collection::vec(any::<u8>(), 0..256),
    ) {
        let buffer = Buffer::new(data, Instant::from_secs(0), kind);
        let parsed = buffer.parse();
        let _ = parsed.is_valid();
        for layer in parsed.extract_layers() {
            let _ = layer.buffer_len();
        }
    }

    #[test]
    fn udp_round_trip(
        source in ipv4_address(),
        destination in ipv4_address(),
        source_port in 1024u16..,
        destination_port in 1024u16..,
        payload in proptest::collection::vec(any::<u8>(), 1..512),
    ) {
        let buffer = build(vec![
            ipv4_layer(source, destination),
            UdpLayer { source_port, destination_port, ..UdpLayer::default() }.into(),
            PayloadLayer::new(payload).into(),
        ]);
        let parsed = buffer.parse();
        prop_assert!(parsed.is_valid());
        let rebuilt = build(parsed.extract_layers());
        prop_assert_eq!(rebuilt.data(), buffer.data());
    }

    #[test]
    fn tcp_options_are_idempotent(
        mss in any::<u16>(),
        scale in 0u8..=14,
        value in any::<u32>(),
        echo_reply in any::<u32>(),
        sack_permitted in any::<bool>(),
    ) {
        let mut options = vec![
            TcpOption::MaximumSegmentSize(mss),
            TcpOption::WindowScale(scale),
            TcpOption::Timestamp { value, echo_reply },
        ];
        if sack_permitted {
            options.push(TcpOption::SackPermitted);
        }
        let buffer = build(vec![
            ipv4_layer(Ipv4Address::new(10, 0, 0, 1), Ipv4Address::new(10, 0, 0, 2)),
            tcp_layer(options.clone()),
        ]);
        let parsed = buffer.parse();
        prop_assert!(parsed.is_valid());

        let layers = parsed.extract_layers();
        let Layer::Tcp(tcp) = &layers[1] else {
            panic!("expected a TCP layer, found {:?}", layers[1]);
        };
        prop_assert_eq!(&tcp.options.as_slice()[..options.len()], &options[..]);
        let rebuilt = build(layers.clone());
        prop_assert_eq!(rebuilt.data(), buffer.data());
        let rebuilt_again = build(rebuilt.parse().extract_layers());
        prop_assert_eq!(rebuilt_again.data(), buffer.data());
    }

    #[test]
    fn repeated_once_only_option_invalidates(first in any::<u16>(), second in any::<u16>()) {
        let buffer = build(vec![
            ipv4_layer(Ipv4Address::new(10, 0, 0, 1), Ipv4Address::new(10, 0, 0, 2)),
            tcp_layer(vec![
                TcpOption::MaximumSegmentSize(first),
                TcpOption::MaximumSegmentSize(second),
            ]),
        ]);
        prop_assert!(!buffer.parse().is_valid());
    }

    #[test]
    fn unknown_icmp_messages_survive(
        kind in 41u8..,
        code in any::<u8>(),
        rest_of_header in any::<u32>(),
        data in proptest::collection::vec(any::<u8>(), 0..64),
    ) {
        let message = IcmpMessage::Unknown { kind, rest_of_header, data };
        let buffer = build(vec![
            ipv4_layer(Ipv4Address::new(192, 0, 2, 1), Ipv4Address::new(192, 0, 2, 2)),
            IcmpLayer { code, checksum: None, message: message.clone() }.into(),
        ]);
        let parsed = buffer.parse();
        prop_assert!(parsed.is_valid());
        let layers = parsed.extract_layers();
        prop_assert_eq!(layers.len(), 2);
        match &layers[1] {
            Layer::Icmp(icmp) => {
                prop_assert_eq!(icmp.code, code);
                prop_assert_eq!(&icmp.message, &message);
            }
            layer => panic!("expected an ICMP layer, found {layer:?}"),
        }
        let rebuilt = build(layers);
        prop_assert_eq!(rebuilt.data(), buffer.data());
    }

    #[test]
    fn dns_names_survive_compression(
        labels in proptest::collection::vec("[a-z][a-z0-9-]{0,14}", 1..5),
        id in any::<u16>(),
    ) {
        let name = DomainName::from_labels(&labels).expect("short labels");
        let mut suffix = name.labels()[1..].to_vec();
        if suffix.is_empty() {
            suffix.push(b"local".to_vec());
        }
        let target = DomainName::from_labels(&suffix).expect("short labels");
        let query = DnsLayer {
            id,
            flags: DnsFlags::RESPONSE,
            questions: vec![DnsQuestion { name: name.clone(), record_type: DnsRecordType::Cname, class: 1 }],
            answers: vec![DnsResourceRecord {
                name,
                class: 1,
                ttl: 60,
                data: DnsRecordData::Cname(target),
            }],
            ..DnsLayer::default()
        };
        let buffer = build(vec![
            ipv4_layer(Ipv4Address::new(192, 0, 2, 53), Ipv4Address::new(192, 0, 2, 1)),
            UdpLayer { source_port: DNS_PORT, destination_port: 40000, ..UdpLayer::default() }.into(),
            query.clone().into(),
        ]);
        let parsed = buffer.parse();
        prop_assert!(parsed.is_valid());
        let layers = parsed.extract_layers();
        prop_assert_eq!(layers.last(), Some(&Layer::Dns(query)));
    }

    #[test]
    fn checksummed_data_sums_to_zero(mut data in proptest::collection::vec(any::<u8>(), 2..512)) {
        data[0] = 0;
        data[1] = 0;
        let value = checksum::internet_checksum(&data);
        data[..2].copy_from_slice(&value.to_be_bytes());
        prop_assert_eq!(checksum::internet_checksum(&data), 0);
    }

    #[test]
    fn ipv4_options_are_idempotent(
        addresses in proptest::collection::vec(ipv4_address(), 0..=8),
        pointer in 0usize..=8,
        stream in any::<u16>(),
    ) {
        let pointed_index = pointer.min(addresses.len()) as u8;
        let options = vec![
            Ipv4Option::RecordRoute(Ipv4Route::new(&addresses, pointed_index).unwrap()),
            Ipv4Option::StreamId(stream),
        ];
        let buffer = build(vec![
            Ipv4Layer {
                source: Ipv4Address::new(10, 0, 0, 1),
                destination: Ipv4Address::new(10, 0, 0, 2),
                options: Options::new(options.clone()).unwrap(),
                ..Ipv4Layer::default()
            }
            .into(),
            UdpLayer { source_port: 1000, destination_port: 2000, ..UdpLayer::default() }.into(),
        ]);
        let parsed = buffer.parse();
        prop_assert!(parsed.is_valid());
        let layers = parsed.extract_layers();
        let Layer::Ipv4(ip) = &layers[0] else {
            panic!("expected an IPv4 layer, found {:?}", layers[0]);
        };
        prop_assert_eq!(&ip.options.as_slice()[..2], &options[..]);
        let rebuilt = build(layers.clone());
        prop_assert_eq!(rebuilt.data(), buffer.data());
    }

    #[test]
    fn repeated_stream_id_invalidates(first in any::<u16>(), second in any::<u16>()) {
        let buffer = build(vec![
            Ipv4Layer {
                options: Options::new(vec![
                    Ipv4Option::StreamId(first),
                    Ipv4Option::StreamId(second),
                ])
                .unwrap(),
                ..Ipv4Layer::default()
            }
            .into(),
            UdpLayer::default().into(),
        ]);
        prop_assert!(!buffer.parse().is_valid());
    }
}

#[test]
fn checksum_of_zeros_is_all_ones() {
    assert_eq!(checksum::internet_checksum(&[0; 20]), 0xffff);
}
