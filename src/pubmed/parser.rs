use quick_xml::Reader;
use quick_xml::events::Event;

const ABSTRACT_TEXT: &[u8] = b"AbstractText";

/// Returns the text of the first `AbstractText` element, including text of
/// nested inline markup (`<i>`, `<sup>`, ...). `None` when the element is
/// absent or blank.
pub fn extract_abstract(xml: &str) -> Result<Option<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);

    let mut depth = 0usize;
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) if depth == 0 && e.local_name().as_ref() == ABSTRACT_TEXT => {
                depth = 1;
            }
            Event::Empty(e) if depth == 0 && e.local_name().as_ref() == ABSTRACT_TEXT => {
                return Ok(None);
            }
            Event::Start(_) if depth > 0 => depth += 1,
            Event::End(_) if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Event::Text(e) if depth > 0 => text.push_str(&e.unescape()?),
            Event::CData(e) if depth > 0 => text.push_str(&String::from_utf8_lossy(&e)),
            Event::Eof => break,
            _ => {}
        }
    }

    let trimmed = text.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}
