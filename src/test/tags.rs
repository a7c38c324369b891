use crate::packet::{Packet, PacketError};

#[derive(Debug, Clone, PartialEq)]
struct FlowTag(u32);

#[derive(Debug, Clone, PartialEq)]
struct ColorTag(&'static str);

#[test]
fn packet_tags_are_unique_per_type() {
    let mut p = Packet::from_bytes(&[0; 8]);
    p.add_packet_tag(FlowTag(7)).expect("first add");
    let dup = p.add_packet_tag(FlowTag(8));
    assert!(matches!(dup, Err(PacketError::DuplicateTag { .. })));
    // 类型不同互不冲突
    p.add_packet_tag(ColorTag("red")).expect("other type");

    assert_eq!(p.peek_packet_tag::<FlowTag>(), Some(FlowTag(7)));
    p.replace_packet_tag(FlowTag(9));
    assert_eq!(p.peek_packet_tag::<FlowTag>(), Some(FlowTag(9)));

    assert!(p.remove_packet_tag::<FlowTag>());
    assert!(!p.remove_packet_tag::<FlowTag>());
    assert_eq!(p.peek_packet_tag::<FlowTag>(), None);
}

#[test]
fn packet_tags_survive_fragmentation() {
    let mut p = Packet::from_bytes(&[0; 10]);
    p.add_packet_tag(FlowTag(5)).expect("add");
    let f = p.create_fragment(2, 4).expect("fragment");
    assert_eq!(f.peek_packet_tag::<FlowTag>(), Some(FlowTag(5)));
}

#[test]
fn byte_tags_shift_with_prepended_bytes() {
    let mut p = Packet::from_bytes(&[0; 10]);
    p.add_byte_tag_range(FlowTag(1), 0, 10);
    p.add_at_start(4);
    let spans: Vec<(u32, u32, FlowTag)> = p.byte_tags().iter().collect();
    assert_eq!(spans, vec![(4, 14, FlowTag(1))]);
}

#[test]
fn byte_tags_clip_when_bytes_are_removed() {
    let mut p = Packet::from_bytes(&[0; 10]);
    p.add_byte_tag_range(FlowTag(1), 0, 4);
    p.add_byte_tag_range(ColorTag("blue"), 6, 10);

    p.remove_at_start(5).expect("in range");
    // 前段整体落入被移除区域，消失；后段左移
    assert!(p.byte_tags().iter::<FlowTag>().next().is_none());
    let spans: Vec<(u32, u32, ColorTag)> = p.byte_tags().iter().collect();
    assert_eq!(spans, vec![(1, 5, ColorTag("blue"))]);

    p.remove_at_end(2).expect("in range");
    let spans: Vec<(u32, u32, ColorTag)> = p.byte_tags().iter().collect();
    assert_eq!(spans, vec![(1, 3, ColorTag("blue"))]);
}

#[test]
fn byte_tags_rebase_into_fragment_coordinates() {
    let mut p = Packet::from_bytes(&[0; 20]);
    p.add_byte_tag_range(FlowTag(1), 0, 5);
    p.add_byte_tag_range(FlowTag(2), 8, 16);

    let f = p.create_fragment(10, 6).expect("fragment");
    let spans: Vec<(u32, u32, FlowTag)> = f.byte_tags().iter().collect();
    // 只有与 [10, 16) 相交的区间存活，并平移到分片坐标
    assert_eq!(spans, vec![(0, 6, FlowTag(2))]);
}

#[test]
fn byte_tags_shift_across_append() {
    let mut left = Packet::from_bytes(&[0; 4]);
    let mut right = Packet::from_bytes(&[0; 4]);
    left.add_byte_tag_range(FlowTag(1), 0, 4);
    right.add_byte_tag_range(FlowTag(2), 1, 3);
    left.append(&right);
    let spans: Vec<(u32, u32, FlowTag)> = left.byte_tags().iter().collect();
    assert_eq!(spans, vec![(0, 4, FlowTag(1)), (5, 7, FlowTag(2))]);
}

#[test]
fn empty_byte_tag_ranges_are_ignored() {
    let mut p = Packet::from_bytes(&[0; 4]);
    p.add_byte_tag_range(FlowTag(1), 2, 2);
    assert!(p.byte_tags().is_empty());
}
