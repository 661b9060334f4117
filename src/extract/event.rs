// src/extract/event.rs

/// Table elements the extractor reacts to. Everything else is `Other`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Element {
    ColGroup,
    Col,
    THead,
    TBody,
    Tr,
    Th,
    Td,
    Other,
}

impl Element {
    /// Classify a tag name, ignoring ASCII case.
    pub fn from_tag(name: &str) -> Self {
        const TAGS: [(&str, Element); 7] = [
            ("colgroup", Element::ColGroup),
            ("col", Element::Col),
            ("thead", Element::THead),
            ("tbody", Element::TBody),
            ("tr", Element::Tr),
            ("th", Element::Th),
            ("td", Element::Td),
        ];
        TAGS.iter()
            .find(|(tag, _)| name.eq_ignore_ascii_case(tag))
            .map(|(_, el)| *el)
            .unwrap_or(Element::Other)
    }

    pub fn is_cell(&self) -> bool {
        matches!(self, Element::Th | Element::Td)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Element::ColGroup => "colgroup",
            Element::Col => "col",
            Element::THead => "thead",
            Element::TBody => "tbody",
            Element::Tr => "tr",
            Element::Th => "th",
            Element::Td => "td",
            Element::Other => "other",
        }
    }
}

/// One structural event of a tokenized document, in document order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event<'a> {
    /// Element start; `class` is the raw `class` attribute, if any.
    Open {
        element: Element,
        class: Option<&'a str>,
    },
    Close(Element),
    Text(&'a str),
    EndOfDocument,
}

impl<'a> Event<'a> {
    pub fn open(element: Element) -> Self {
        Event::Open {
            element,
            class: None,
        }
    }
}
