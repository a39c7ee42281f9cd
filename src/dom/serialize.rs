use super::{NodeContent, NodeData};

pub(super) fn write_inner(nodes: &[NodeData], data: &NodeData, buffer: &mut String) {
    match &data.content {
        NodeContent::Empty => {}
        NodeContent::Text(text) => push_escaped_text(text, buffer),
        NodeContent::Markup(markup) => buffer.push_str(markup),
    }
    for child in &data.children {
        write_outer(nodes, &nodes[child.0], buffer);
    }
}

fn write_outer(nodes: &[NodeData], data: &NodeData, buffer: &mut String) {
    buffer.push('<');
    buffer.push_str(&data.tag);
    if !data.classes.is_empty() {
        buffer.push_str(" class=\"");
        push_escaped_attribute(&data.classes.join(" "), buffer);
        buffer.push('"');
    }
    for (name, value) in &data.attributes {
        buffer.push(' ');
        buffer.push_str(name);
        buffer.push_str("=\"");
        push_escaped_attribute(value, buffer);
        buffer.push('"');
    }
    buffer.push('>');
    write_inner(nodes, data, buffer);
    buffer.push_str("</");
    buffer.push_str(&data.tag);
    buffer.push('>');
}

fn push_escaped_text(value: &str, buffer: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => buffer.push_str("&amp;"),
            '<' => buffer.push_str("&lt;"),
            '>' => buffer.push_str("&gt;"),
            _ => buffer.push(ch),
        }
    }
}

fn push_escaped_attribute(value: &str, buffer: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => buffer.push_str("&amp;"),
            '"' => buffer.push_str("&quot;"),
            '<' => buffer.push_str("&lt;"),
            '>' => buffer.push_str("&gt;"),
            _ => buffer.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::dom::Document;

    #[test]
    fn serializes_classes_attributes_and_markup() {
        let doc = Document::new();
        let root = doc.create_element("div");
        let marker = doc.create_element("SPAN");
        doc.append_child(root, marker).expect("append");
        doc.add_class(marker, "smart-content").expect("class");
        doc.set_attribute(marker, "data-content", "\"x\" & y")
            .expect("attr");
        doc.set_inner_markup(marker, "<span class=\"katex\">x</span>")
            .expect("markup");

        assert_eq!(
            doc.inner_html(root),
            "<span class=\"smart-content\" data-content=\"&quot;x&quot; &amp; y\">\
             <span class=\"katex\">x</span></span>"
        );
    }
}
