use std::net::Ipv4Addr;

use crate::hdr::{
    Ecn, EthernetHeader, Icmpv4Header, Icmpv4Kind, Ipv4Header, Mac, PROTO_TCP, PfcHeader,
    SeqTsHeader, TcpFlags, TcpHeader,
};
use crate::packet::Header;

fn round_trip<H: Header + PartialEq + std::fmt::Debug>(h: &H) {
    let mut buf = vec![0u8; h.serialized_size()];
    h.serialize(&mut buf);
    let (got, used) = H::deserialize(&buf).expect("deserialize");
    assert_eq!(used, buf.len());
    assert_eq!(&got, h);
}

#[test]
fn ethernet_round_trip() {
    round_trip(&EthernetHeader {
        dst: Mac::from_node(12),
        src: Mac::from_node(3),
        ethertype: 0x0800,
    });
}

#[test]
fn mac_from_node_is_stable_and_unicast() {
    let m = Mac::from_node(0x01020304);
    assert_eq!(m, Mac([0x02, 0x00, 0x01, 0x02, 0x03, 0x04]));
    assert_ne!(m, Mac::BROADCAST);
}

#[test]
fn ipv4_round_trip_preserves_dscp_and_ecn() {
    let mut h = Ipv4Header::new(
        Ipv4Addr::new(10, 0, 0, 1),
        Ipv4Addr::new(10, 0, 0, 2),
        PROTO_TCP,
        1460,
    );
    h.dscp = 3;
    h.ecn = Ecn::Ect1;
    assert_eq!(h.total_len, 1480);
    round_trip(&h);

    // TOS 字节布局：dscp 高 6 位，ECN 低 2 位
    let mut buf = [0u8; 20];
    h.serialize(&mut buf);
    assert_eq!(buf[1], (3 << 2) | 0b01);
}

#[test]
fn ipv4_checksum_verifies_to_zero() {
    let h = Ipv4Header::new(
        Ipv4Addr::new(10, 0, 0, 1),
        Ipv4Addr::new(10, 0, 0, 200),
        PROTO_TCP,
        512,
    );
    let mut buf = [0u8; 20];
    h.serialize(&mut buf);
    // RFC 1071：含校验和在内的 16 位反码和必须为全 1
    let mut sum: u32 = 0;
    for w in buf.chunks(2) {
        sum += u32::from(u16::from_be_bytes([w[0], w[1]]));
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    assert_eq!(sum, 0xffff);
}

#[test]
fn ipv4_rejects_non_v4() {
    let buf = [0x65u8; 20];
    assert!(Ipv4Header::deserialize(&buf).is_err());
}

#[test]
fn ecn_mark_ce_only_touches_ect() {
    let mut h = Ipv4Header::new(Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED, PROTO_TCP, 0);
    assert!(!h.mark_ce_if_ect());
    assert_eq!(h.ecn, Ecn::NotEct);
    h.ecn = Ecn::Ect0;
    assert!(h.mark_ce_if_ect());
    assert_eq!(h.ecn, Ecn::Ce);
    // 已是 CE 时标记保持
    assert!(!h.mark_ce_if_ect());
    assert_eq!(h.ecn, Ecn::Ce);
}

#[test]
fn tcp_round_trip_keeps_all_nine_flags() {
    let mut h = TcpHeader::new(49152, 5001);
    h.seq = 0xdead_beef;
    h.ack = 0x0102_0304;
    h.flags = TcpFlags::SYN | TcpFlags::ACK | TcpFlags::ECE | TcpFlags::CWR | TcpFlags::NS;
    h.window = 4096;
    round_trip(&h);

    // NS 位落在保留域最低位
    let mut buf = [0u8; 20];
    h.serialize(&mut buf);
    assert_eq!(buf[12] & 0x01, 1);
}

#[test]
fn tcp_flag_set_operations() {
    let mut f = TcpFlags::SYN;
    assert!(f.contains(TcpFlags::SYN));
    assert!(!f.contains(TcpFlags::SYN | TcpFlags::ACK));
    f.insert(TcpFlags::ACK);
    assert!(f.contains(TcpFlags::SYN | TcpFlags::ACK));
    assert!(f.intersects(TcpFlags::ACK | TcpFlags::FIN));
    assert_eq!(format!("{}", TcpFlags::SYN | TcpFlags::ACK), "SYN|ACK");
    assert_eq!(format!("{}", TcpFlags::default()), "-");
}

#[test]
fn pfc_pause_and_resume_frames() {
    let pause = PfcHeader::pause(3, 0xffff);
    assert!(pause.enabled(3));
    assert!(!pause.enabled(4));
    assert_eq!(pause.quanta[3], 0xffff);
    round_trip(&pause);

    let resume = PfcHeader::resume(3);
    assert!(resume.enabled(3));
    assert_eq!(resume.quanta[3], 0);
    round_trip(&resume);
}

#[test]
fn pfc_rejects_wrong_opcode() {
    let buf = [0u8; 20];
    assert!(PfcHeader::deserialize(&buf).is_err());
}

#[test]
fn icmp_round_trips_all_kinds() {
    round_trip(&Icmpv4Header {
        kind: Icmpv4Kind::Echo { ident: 7, seq: 99 },
    });
    round_trip(&Icmpv4Header {
        kind: Icmpv4Kind::EchoReply { ident: 7, seq: 99 },
    });
    round_trip(&Icmpv4Header {
        kind: Icmpv4Kind::DestUnreachable { code: 3 },
    });
    round_trip(&Icmpv4Header {
        kind: Icmpv4Kind::TimeExceeded { code: 0 },
    });
}

#[test]
fn seq_ts_detects_int_stub_by_exact_length() {
    let plain = SeqTsHeader::new(11, 22);
    round_trip(&plain);

    let mut with_int = SeqTsHeader::new(11, 22);
    with_int.with_int = true;
    assert_eq!(with_int.serialized_size(), 20);
    round_trip(&with_int);

    // 缓冲超长时不按 INT 解析
    let mut buf = vec![0u8; 24];
    plain.serialize(&mut buf[..12]);
    let (got, used) = SeqTsHeader::deserialize(&buf).expect("deserialize");
    assert!(!got.with_int);
    assert_eq!(used, 12);
}
