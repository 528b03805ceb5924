use serde::Serialize;

use crate::geometry::PixelRect;

/// The output of one recognition pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecognitionDocument {
    pub text: String,
    pub blocks: Vec<Block>,
}

impl RecognitionDocument {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// All word elements in block, line, element order.
    pub fn elements(&self) -> impl Iterator<Item = &WordElement> {
        self.blocks
            .iter()
            .flat_map(|block| &block.lines)
            .flat_map(|line| &line.elements)
    }
}

/// The lines recognized for a single observation, one per distinct candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Block {
    pub lines: Vec<Line>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Line {
    pub elements: Vec<WordElement>,
}

impl Line {
    /// The candidate text this line was segmented from.
    pub fn text(&self) -> String {
        self.elements
            .iter()
            .map(|it| it.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WordElement {
    pub text: String,
    pub confidence: f32,
    pub bounding_box: PixelRect,
    pub recognized_language: String,
}
