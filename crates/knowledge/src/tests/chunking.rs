use crate::chunker::Chunker;
use crate::document::Document;
use crate::types::Chunk;

/// Deterministic, non-repeating-looking text of exactly `len` characters.
fn sample_text(len: usize) -> String {
    let words = ["policy", "leave", "review", "budget", "audit", "team", "onboarding", "ç", "日本"];
    let mut text = String::new();
    let mut i = 0;
    while text.chars().count() < len {
        text.push_str(words[i % words.len()]);
        text.push_str(if i % 7 == 0 { ".\n" } else { " " });
        i += 1;
    }
    text.chars().take(len).collect()
}

fn reconstruct(chunks: &[Chunk]) -> String {
    let mut text = String::new();
    for chunk in chunks {
        text.extend(chunk.text.chars().skip(chunk.overlap));
    }
    text
}

#[test]
fn five_thousand_chars_make_six_overlapping_chunks() {
    let text = sample_text(5000);
    let doc = Document::from_text("report", text.clone()).unwrap();
    let chunker = Chunker::new(1000, 200, 100).unwrap();

    let chunks = chunker.chunk(&doc).unwrap();

    assert_eq!(chunks.len(), 6);
    for pair in chunks.windows(2) {
        let tail: String = pair[0].text.chars().skip(pair[0].char_len() - 200).collect();
        let head: String = pair[1].text.chars().take(200).collect();
        assert_eq!(tail, head);
        assert_eq!(pair[1].overlap, 200);
    }
    assert_eq!(chunks[0].overlap, 0);
    assert_eq!(chunks.last().unwrap().end, 5000);
}

#[test]
fn chunks_reconstruct_the_document() {
    let configs = [(1000, 200, 100), (64, 0, 1), (50, 25, 5), (7, 3, 2), (300, 60, 30)];

    for len in [1, 49, 50, 51, 777, 2048] {
        let text = sample_text(len);
        for (size, overlap, min_chunk) in configs {
            let chunker = Chunker::new(size, overlap, min_chunk).unwrap();
            let chunks = chunker.chunk_text("doc", &text).unwrap();

            assert_eq!(reconstruct(&chunks), text, "size {} len {}", size, len);
            for (i, chunk) in chunks.iter().enumerate() {
                assert_eq!(chunk.index as usize, i);
                assert!(chunk.char_len() <= chunker.max_chunk_chars());
                assert!(!chunk.text.is_empty());
            }
        }
    }
}

#[test]
fn chunking_is_deterministic() {
    let text = sample_text(3333);
    let chunker = Chunker::default();
    assert_eq!(
        chunker.chunk_text("doc", &text).unwrap(),
        chunker.chunk_text("doc", &text).unwrap()
    );
}

#[test]
fn tail_never_falls_below_minimum() {
    let chunker = Chunker::new(100, 20, 30).unwrap();
    for len in 100..400 {
        let text = sample_text(len);
        let chunks = chunker.chunk_text("doc", &text).unwrap();
        if chunks.len() > 1 {
            let last = chunks.last().unwrap();
            assert!(last.char_len() - last.overlap >= 30);
        }
    }
}
