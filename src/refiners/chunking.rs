//! Shared chunker used by every refiner, grounded on `KeywordRefiner._simple_chunk`:
//! split by blank-line paragraphs (falling back to single newlines when the
//! text has no blank-line breaks), then by sentence for any paragraph that
//! overflows `chunk_size`, then hard-slice any sentence still too big.

use crate::types::{make_chunk_id, EvidenceChunk};

/// A chunk of page text before scoring, carrying the pieces an
/// `EvidenceChunk` needs once a refiner assigns it a score.
pub struct RawChunk {
    pub url: String,
    pub chunk_id: String,
    pub content: String,
    pub title: Option<String>,
}

impl RawChunk {
    pub fn into_evidence(self, relevance_score: f32) -> EvidenceChunk {
        EvidenceChunk {
            url: self.url,
            chunk_id: self.chunk_id,
            content: self.content,
            relevance_score,
            title: self.title,
            is_answer: false,
        }
    }
}

/// Split `text` into chunks of roughly `chunk_size` characters, preferring
/// paragraph boundaries over mid-sentence cuts.
pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<String> {
    let mut paragraphs: Vec<&str> = text.split("\n\n").collect();
    if paragraphs.len() == 1 {
        paragraphs = text.split('\n').collect();
    }

    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0usize;

    let flush = |current: &mut Vec<String>, current_len: &mut usize, chunks: &mut Vec<String>| {
        if !current.is_empty() {
            chunks.push(current.join("\n"));
            current.clear();
            *current_len = 0;
        }
    };

    for raw_p in paragraphs {
        let p = raw_p.trim();
        if p.is_empty() {
            continue;
        }

        if p.len() > chunk_size {
            flush(&mut current, &mut current_len, &mut chunks);

            for sentence in split_sentences(p) {
                if sentence.len() > chunk_size {
                    for hard_slice in hard_slice(&sentence, chunk_size) {
                        chunks.push(hard_slice);
                    }
                } else if current_len + sentence.len() > chunk_size {
                    flush(&mut current, &mut current_len, &mut chunks);
                    current_len = sentence.len();
                    current.push(sentence);
                } else {
                    current_len += sentence.len();
                    current.push(sentence);
                }
            }
        } else if current_len + p.len() > chunk_size {
            flush(&mut current, &mut current_len, &mut chunks);
            current_len = p.len();
            current.push(p.to_string());
        } else {
            current_len += p.len();
            current.push(p.to_string());
        }
    }
    flush(&mut current, &mut current_len, &mut chunks);
    chunks
}

fn split_sentences(p: &str) -> Vec<String> {
    p.replace(". ", ".\n").split('\n').map(|s| s.to_string()).collect()
}

fn hard_slice(s: &str, chunk_size: usize) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    chars
        .chunks(chunk_size)
        .map(|c| c.iter().collect::<String>())
        .collect()
}

/// Chunk every page's `text_plain`, assigning each chunk a stable
/// `chunk_id = hash(url, ordinal)`. Pages with no extracted text are
/// skipped.
pub fn chunk_pages(pages: &[crate::types::FetchedPage], chunk_size: usize) -> Vec<RawChunk> {
    let mut out = Vec::new();
    for page in pages {
        let Some(text) = page.text_plain.as_ref().filter(|t| !t.trim().is_empty()) else {
            continue;
        };
        for (idx, content) in chunk_text(text, chunk_size).into_iter().enumerate() {
            out.push(RawChunk {
                url: page.url.clone(),
                chunk_id: make_chunk_id(&page.url, idx),
                content,
                title: page.title.clone(),
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_text_splits_on_blank_line_paragraphs() {
        let text = "first paragraph\n\nsecond paragraph";
        let chunks = chunk_text(text, 500);
        assert_eq!(chunks, vec!["first paragraph\nsecond paragraph"]);
    }

    #[test]
    fn chunk_text_starts_new_chunk_once_over_size() {
        let text = format!("{}\n\n{}", "a".repeat(40), "b".repeat(40));
        let chunks = chunk_text(&text, 50);
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn chunk_text_hard_slices_oversize_sentence() {
        let text = "x".repeat(250);
        let chunks = chunk_text(&text, 100);
        assert!(chunks.iter().all(|c| c.len() <= 100));
        assert_eq!(chunks.iter().map(|c| c.len()).sum::<usize>(), 250);
    }

    #[test]
    fn chunk_pages_skips_pages_without_text() {
        let mut page = crate::types::FetchedPage::failed("http://a.com", "x");
        page.error = None;
        let chunks = chunk_pages(&[page], 500);
        assert!(chunks.is_empty());
    }

    #[test]
    fn chunk_pages_assigns_stable_ids() {
        let mut page = crate::types::FetchedPage::failed("http://a.com", "x");
        page.error = None;
        page.text_plain = Some("hello world, this is some content".to_string());
        let chunks = chunk_pages(&[page], 500);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, make_chunk_id("http://a.com", 0));
    }
}
