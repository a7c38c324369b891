use crate::hdr::{EthernetHeader, Mac, TcpFlags, TcpHeader};
use crate::packet::{Packet, PacketError};

#[test]
fn size_counts_virtual_and_real_bytes() {
    let mut p = Packet::from_bytes(&[1, 2, 3, 4]);
    assert_eq!(p.size(), 4);
    p.add_padding_at_end(100);
    assert_eq!(p.size(), 104);
    p.add_at_start(10);
    assert_eq!(p.size(), 114);
    assert_eq!(p.to_bytes().len(), 114);
}

#[test]
fn virtual_payload_reads_as_zeros_without_allocation() {
    let p = Packet::with_virtual_payload(1000);
    assert_eq!(p.size(), 1000);
    assert!(p.to_bytes().iter().all(|&b| b == 0));
}

#[test]
fn clone_shares_uid_copy_reallocates() {
    let p = Packet::from_bytes(b"hello");
    let shared = p.clone();
    let deep = p.copy();
    assert_eq!(p.uid(), shared.uid());
    assert_ne!(p.uid(), deep.uid());
    assert_eq!(deep.to_bytes(), p.to_bytes());
}

#[test]
fn writes_after_clone_do_not_leak_into_the_other_view() {
    let p = Packet::from_bytes(b"payload");
    let mut q = p.clone();
    let eth = EthernetHeader {
        dst: Mac::from_node(1),
        src: Mac::from_node(0),
        ethertype: 0x0800,
    };
    q.add_header(&eth);
    assert_eq!(q.size(), 21);
    // 原视图的字节不受写入影响
    assert_eq!(p.to_bytes(), b"payload");
}

#[test]
fn remove_at_start_consumes_virtual_then_real() {
    let mut p = Packet::from_bytes(&[9, 8, 7]);
    p.add_at_start(2); // 真实零字节
    p.add_padding_at_end(4);
    assert_eq!(p.size(), 9);
    p.remove_at_start(3).expect("in range");
    assert_eq!(p.to_bytes(), vec![8, 7, 0, 0, 0, 0]);
    let err = p.remove_at_start(100);
    assert!(matches!(err, Err(PacketError::Truncation { .. })));
}

#[test]
fn remove_at_end_consumes_virtual_tail_first() {
    let mut p = Packet::from_bytes(&[1, 2, 3]);
    p.add_padding_at_end(5);
    p.remove_at_end(6).expect("in range");
    assert_eq!(p.to_bytes(), vec![1, 2]);
}

#[test]
fn fragment_shares_uid_and_selects_the_window() {
    let mut p = Packet::from_bytes(&[10, 20, 30, 40]);
    p.add_padding_at_end(4);
    let f = p.create_fragment(2, 4).expect("in range");
    assert_eq!(f.uid(), p.uid());
    assert_eq!(f.to_bytes(), vec![30, 40, 0, 0]);
    assert!(p.create_fragment(6, 4).is_err());
}

#[test]
fn append_concatenates_bytes() {
    let mut left = Packet::from_bytes(&[1, 2]);
    let mut right = Packet::from_bytes(&[3]);
    right.add_padding_at_end(2);
    left.append(&right);
    assert_eq!(left.to_bytes(), vec![1, 2, 3, 0, 0]);

    // 右侧全虚拟：只累计计数
    let virt = Packet::with_virtual_payload(3);
    left.append(&virt);
    assert_eq!(left.size(), 8);
}

#[test]
fn header_stack_is_lifo() {
    let mut p = Packet::from_bytes(b"data");
    let mut th = TcpHeader::new(1000, 2000);
    th.seq = 42;
    th.flags = TcpFlags::ACK | TcpFlags::PSH;
    p.add_header(&th);
    let eth = EthernetHeader {
        dst: Mac::BROADCAST,
        src: Mac::from_node(3),
        ethertype: 0x0800,
    };
    p.add_header(&eth);
    assert_eq!(p.size(), 4 + 20 + 14);

    let got_eth = p.remove_header::<EthernetHeader>().expect("eth");
    assert_eq!(got_eth, eth);
    let peeked = p.peek_header::<TcpHeader>().expect("peek tcp");
    assert_eq!(peeked.seq, 42);
    let got_th = p.remove_header::<TcpHeader>().expect("tcp");
    assert_eq!(got_th, th);
    assert_eq!(p.to_bytes(), b"data");
}

#[test]
fn deserialize_on_short_buffer_fails() {
    let p = Packet::from_bytes(&[0u8; 5]);
    assert!(p.peek_header::<TcpHeader>().is_err());
}
