//! Fenced blocks and the ordered block collection.
//!
//! A block's content is seeded with the opening fence and its language tag
//! (for example "```python"), followed by everything that arrived before the
//! closing fence. The closing fence itself is never part of the content.

use serde::{Deserialize, Serialize};

use super::error::StreamError;

/// Three backticks: opens or closes a block.
pub const FENCE: &str = "```";

/// Lifecycle state of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    Open,
    Closed,
}

/// What sealed a closed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Closure {
    /// A closing fence arrived.
    Fence,
    /// The stream ended (or was interrupted) before a closing fence.
    EndOfStream,
}

/// A fenced region of the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    language: Option<String>,
    content: String,
    status: BlockStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    closed_by: Option<Closure>,
}

impl Block {
    /// Creates an open block seeded with the fence and the language tag seen so far.
    pub(crate) fn open(sequence: u64, language: Option<String>) -> Self {
        let language = language.filter(|tag| !tag.is_empty());
        let mut content = String::from(FENCE);
        if let Some(tag) = &language {
            content.push_str(tag);
        }
        Self {
            sequence,
            language,
            content,
            status: BlockStatus::Open,
            closed_by: None,
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Full accumulated content, including the seeded fence and tag.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Content after the seeded "```" + tag header.
    pub fn body(&self) -> &str {
        self.content.get(self.header_len()..).unwrap_or_default()
    }

    pub fn status(&self) -> BlockStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.status == BlockStatus::Open
    }

    pub fn closed_by(&self) -> Option<Closure> {
        self.closed_by
    }

    /// True when the block was sealed at end of stream rather than by a fence.
    pub fn is_unterminated(&self) -> bool {
        self.closed_by == Some(Closure::EndOfStream)
    }

    fn header_len(&self) -> usize {
        FENCE.len() + self.language.as_ref().map_or(0, String::len)
    }

    /// Extends the language tag. Only valid before any body text arrived.
    pub(crate) fn push_language(&mut self, fragment: &str) -> Result<(), StreamError> {
        if !self.is_open() {
            return Err(StreamError::ordering(format!(
                "language extended on closed block {}",
                self.sequence
            )));
        }
        if self.content.len() != self.header_len() {
            return Err(StreamError::ordering(format!(
                "language extended after body text in block {}",
                self.sequence
            )));
        }
        self.language
            .get_or_insert_with(String::new)
            .push_str(fragment);
        self.content.push_str(fragment);
        Ok(())
    }

    pub(crate) fn push_content(&mut self, text: &str) -> Result<(), StreamError> {
        if !self.is_open() {
            return Err(StreamError::ordering(format!(
                "append to closed block {}",
                self.sequence
            )));
        }
        self.content.push_str(text);
        Ok(())
    }

    pub(crate) fn seal(mut self, closure: Closure) -> Self {
        self.status = BlockStatus::Closed;
        self.closed_by = Some(closure);
        self
    }
}

/// Closed blocks in open order, keyed by sequence number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockCollection {
    blocks: Vec<Block>,
}

impl BlockCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a closed block. Sequences must strictly increase.
    pub fn push(&mut self, block: Block) -> Result<&Block, StreamError> {
        if block.is_open() {
            return Err(StreamError::ordering(format!(
                "block {} added to collection while still open",
                block.sequence
            )));
        }
        if let Some(last) = self.blocks.last()
            && block.sequence <= last.sequence
        {
            return Err(StreamError::ordering(format!(
                "block {} added after block {}",
                block.sequence, last.sequence
            )));
        }
        self.blocks.push(block);
        Ok(&self.blocks[self.blocks.len() - 1])
    }

    pub fn get(&self, sequence: u64) -> Option<&Block> {
        self.blocks
            .binary_search_by_key(&sequence, Block::sequence)
            .ok()
            .map(|idx| &self.blocks[idx])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Block> {
        self.blocks.iter()
    }

    pub fn last(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn as_slice(&self) -> &[Block] {
        &self.blocks
    }

    pub fn into_vec(self) -> Vec<Block> {
        self.blocks
    }
}

impl<'a> IntoIterator for &'a BlockCollection {
    type Item = &'a Block;
    type IntoIter = std::slice::Iter<'a, Block>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed(sequence: u64, body: &str) -> Block {
        let mut block = Block::open(sequence, Some("rust".to_string()));
        block.push_content(body).unwrap();
        block.seal(Closure::Fence)
    }

    #[test]
    fn test_open_block_is_seeded_with_fence_and_tag() {
        let block = Block::open(1, Some("python".to_string()));
        assert_eq!(block.content(), "```python");
        assert_eq!(block.body(), "");
        assert_eq!(block.language(), Some("python"));
        assert!(block.is_open());
    }

    #[test]
    fn test_empty_tag_is_no_language() {
        let block = Block::open(1, Some(String::new()));
        assert_eq!(block.language(), None);
        assert_eq!(block.content(), "```");
    }

    #[test]
    fn test_language_grows_until_body_starts() {
        let mut block = Block::open(3, Some("py".to_string()));
        block.push_language("thon").unwrap();
        assert_eq!(block.language(), Some("python"));
        assert_eq!(block.content(), "```python");

        block.push_content("x = 1").unwrap();
        assert_eq!(block.body(), "x = 1");
        assert!(block.push_language("3").is_err());
    }

    #[test]
    fn test_sealed_block_rejects_appends() {
        let block = closed(1, "fn main() {}");
        assert_eq!(block.status(), BlockStatus::Closed);
        assert_eq!(block.closed_by(), Some(Closure::Fence));

        let mut block = block;
        let err = block.push_content("more").unwrap_err();
        assert!(matches!(err, StreamError::OrderingViolation(_)));
        assert_eq!(block.body(), "fn main() {}");
    }

    #[test]
    fn test_collection_orders_and_looks_up_by_sequence() {
        let mut blocks = BlockCollection::new();
        blocks.push(closed(1, "a")).unwrap();
        blocks.push(closed(4, "b")).unwrap();

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks.get(4).map(Block::body), Some("b"));
        assert!(blocks.get(2).is_none());
        let order: Vec<u64> = blocks.iter().map(Block::sequence).collect();
        assert_eq!(order, vec![1, 4]);
    }

    #[test]
    fn test_collection_rejects_out_of_order_and_open_blocks() {
        let mut blocks = BlockCollection::new();
        blocks.push(closed(2, "a")).unwrap();
        assert!(blocks.push(closed(2, "b")).is_err());
        assert!(blocks.push(closed(1, "c")).is_err());
        assert!(blocks.push(Block::open(5, None)).is_err());
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn test_block_serializes_without_empty_optionals() {
        let block = Block::open(1, None);
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["status"], "open");
        assert!(json.get("language").is_none());
        assert!(json.get("closed_by").is_none());
    }
}
