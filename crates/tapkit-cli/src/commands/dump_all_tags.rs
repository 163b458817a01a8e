//! Dump all TLV tags found on card, including unknown ones

use tapkit_common::tlv::{self, TlvNode};

/// Parse and display every TLV object in data, descending into templates
pub fn dump_all_tags(data: &[u8], indent: usize) {
    let (nodes, error) = tlv::parse_with_diagnostics(data);
    print_nodes(&nodes, indent);
    if let Some(error) = error {
        println!("{}(stopped: {})", " ".repeat(indent * 2), error);
    }
}

fn print_nodes(nodes: &[TlvNode], indent: usize) {
    let indent_str = " ".repeat(indent * 2);
    for node in nodes {
        print!("{}[{}] {}: ", indent_str, node.tag_hex(), node.name());

        if node.is_constructed() && !node.children.is_empty() {
            println!("({} bytes)", node.value.len());
            print_nodes(&node.children, indent + 1);
        } else if node.value.len() <= 32 {
            println!("{}", hex::encode_upper(&node.value));
        } else {
            println!(
                "{}... ({} bytes)",
                hex::encode_upper(&node.value[..32]),
                node.value.len()
            );
        }
    }
}
