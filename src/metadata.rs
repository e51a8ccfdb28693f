use serde::Deserialize;

use crate::dom::Element;

/// Descriptive fields for the merged document's `<metadata>` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GpxMetaData {
    name: Option<String>,
    description: Option<String>,
    author: Option<String>,
}

impl GpxMetaData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for setting all three fields at once.
    pub fn create(
        name: impl Into<String>,
        description: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            description: Some(description.into()),
            author: Some(author.into()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    /// Build the `<metadata>` element.
    ///
    /// Each child is emitted only when its field is non-empty. The `<author>`
    /// element's inner `<name>` holds the document name, not the author
    /// string, and is empty when no name is set.
    pub fn to_element(&self) -> Element {
        let mut metadata = Element::new("metadata");

        if let Some(name) = non_empty(self.name()) {
            metadata.append_child(Element::with_text("name", name));
        }

        if let Some(description) = non_empty(self.description()) {
            metadata.append_child(Element::with_text("desc", description));
        }

        if non_empty(self.author()).is_some() {
            let mut author = Element::new("author");
            author.append_child(Element::with_text("name", self.name().unwrap_or_default()));
            metadata.append_child(author);
        }

        metadata
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
