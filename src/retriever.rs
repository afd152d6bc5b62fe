//! Passage retrieval for corpus-augmented turns.
//!
//! A corpus is cut into fixed-length word windows, every window is embedded once, and each
//! query is answered with the windows whose embeddings lie nearest to the query's.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Default number of whitespace-separated words per passage.
pub const DEFAULT_PASSAGE_WORDS: usize = 100;

/// Default number of passages returned per query.
pub const DEFAULT_TOP_K: usize = 1;

/// Finds the passages most relevant to a query.
#[async_trait::async_trait]
pub trait PassageRetriever: Send + Sync {
    /// Returns at most `top_k` passages, most relevant first.
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<String>>;
}

/// Maps texts to dense vectors.  Every vector an embedder returns has the same length.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[async_trait::async_trait]
impl<F> Embedder for F
where
    F: Fn(&str) -> Vec<f32> + Send + Sync,
{
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self(text)).collect())
    }
}

/// Splits `corpus` into passages of `passage_words` whitespace-separated words.
pub fn split_passages(corpus: &str, passage_words: usize) -> Result<Vec<String>> {
    if passage_words == 0 {
        return Err(Error::validation(
            "passage length must be at least one word",
            Some("passage_words".to_string()),
        ));
    }
    let words: Vec<&str> = corpus.split_whitespace().collect();
    Ok(words
        .chunks(passage_words)
        .map(|chunk| chunk.join(" "))
        .collect())
}

/// An in-memory nearest-neighbour index over a fixed text corpus.
///
/// Ranking is by Euclidean distance between embeddings; a query always gets the `top_k`
/// nearest passages, however distant.
///
/// ```
/// use std::sync::Arc;
/// use colloquy::{CorpusRetriever, Embedder, PassageRetriever};
/// # tokio_test::block_on(async {
/// let embedder: Arc<dyn Embedder> =
///     Arc::new(|text: &str| vec![text.matches('玉').count() as f32]);
/// let retriever = CorpusRetriever::from_text("宝钗 湘云 宝玉 黛玉", 2, embedder)
///     .await
///     .unwrap();
/// let hits = retriever.retrieve("宝玉和黛玉", 1).await.unwrap();
/// assert_eq!(hits, vec!["宝玉 黛玉"]);
/// # });
/// ```
pub struct CorpusRetriever {
    passages: Vec<String>,
    vectors: Vec<Vec<f32>>,
    embedder: Arc<dyn Embedder>,
}

impl CorpusRetriever {
    /// Embeds `passages` and indexes them.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Retrieval`] when the embedder fails or returns vectors that do not
    /// line up with the passages.
    pub async fn build(passages: Vec<String>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let vectors = if passages.is_empty() {
            Vec::new()
        } else {
            embedder.embed(&passages).await?
        };
        if vectors.len() != passages.len() {
            return Err(Error::retrieval(format!(
                "embedder returned {} vectors for {} passages",
                vectors.len(),
                passages.len()
            )));
        }
        if let Some(first) = vectors.first() {
            if vectors.iter().any(|v| v.len() != first.len()) {
                return Err(Error::retrieval("embedder returned vectors of differing length"));
            }
        }
        Ok(Self {
            passages,
            vectors,
            embedder,
        })
    }

    /// Splits corpus text into passages and indexes them.
    pub async fn from_text(
        corpus: &str,
        passage_words: usize,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        Self::build(split_passages(corpus, passage_words)?, embedder).await
    }

    /// Reads a UTF-8 corpus file and indexes it.
    pub async fn from_path(
        path: impl AsRef<Path>,
        passage_words: usize,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let corpus = tokio::fs::read_to_string(path).await.map_err(|err| {
            Error::retrieval(format!("cannot read corpus {}: {err}", path.display()))
        })?;
        let retriever = Self::from_text(&corpus, passage_words, embedder).await?;
        tracing::info!(
            corpus = %path.display(),
            passages = retriever.len(),
            "indexed retrieval corpus"
        );
        Ok(retriever)
    }

    /// Number of passages in the corpus.
    pub fn len(&self) -> usize {
        self.passages.len()
    }

    /// True when the corpus contained no words.
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// The passages in corpus order.
    pub fn passages(&self) -> impl Iterator<Item = &str> {
        self.passages.iter().map(String::as_str)
    }

    fn nearest(&self, query: &[f32], top_k: usize) -> Result<Vec<String>> {
        if let Some(first) = self.vectors.first() {
            if first.len() != query.len() {
                return Err(Error::retrieval(format!(
                    "query vector has {} dimensions, index has {}",
                    query.len(),
                    first.len()
                )));
            }
        }
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .map(|v| squared_distance(query, v))
            .enumerate()
            .collect();
        // stable: equal distances keep corpus order
        scored.sort_by(|lhs, rhs| lhs.1.total_cmp(&rhs.1));
        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(idx, _)| self.passages[idx].clone())
            .collect())
    }
}

impl fmt::Debug for CorpusRetriever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorpusRetriever")
            .field("passages", &self.passages.len())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl PassageRetriever for CorpusRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<String>> {
        if self.passages.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let query = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .pop()
            .ok_or_else(|| Error::retrieval("embedder returned no vector for the query"))?;
        self.nearest(&query, top_k)
    }
}

fn squared_distance(lhs: &[f32], rhs: &[f32]) -> f32 {
    lhs.iter().zip(rhs).map(|(a, b)| (a - b) * (a - b)).sum()
}

#[cfg(feature = "fastembed-embeddings")]
pub use self::fast::FastEmbedder;

#[cfg(feature = "fastembed-embeddings")]
mod fast {
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

    use super::Embedder;
    use crate::error::{Error, Result};

    /// Local sentence embeddings from the multilingual paraphrase MiniLM model.
    ///
    /// The model is fetched on first use and cached on disk.
    #[derive(Clone)]
    pub struct FastEmbedder {
        model: Arc<Mutex<TextEmbedding>>,
    }

    impl FastEmbedder {
        /// Loads the model into the default cache directory.
        pub fn new() -> Result<Self> {
            Self::with_cache_dir(None)
        }

        /// Loads the model, caching it under `cache_dir` when given.
        pub fn with_cache_dir(cache_dir: Option<PathBuf>) -> Result<Self> {
            let mut options = InitOptions::new(EmbeddingModel::ParaphraseMLMiniLML12V2)
                .with_show_download_progress(false);
            if let Some(dir) = cache_dir {
                options = options.with_cache_dir(dir);
            }
            let model = TextEmbedding::try_new(options)
                .map_err(|err| Error::retrieval(format!("cannot load embedding model: {err}")))?;
            Ok(Self {
                model: Arc::new(Mutex::new(model)),
            })
        }
    }

    #[async_trait::async_trait]
    impl Embedder for FastEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let model = Arc::clone(&self.model);
            let texts = texts.to_vec();
            tokio::task::spawn_blocking(move || {
                let mut model = model
                    .lock()
                    .map_err(|_| Error::retrieval("embedding model lock poisoned"))?;
                model
                    .embed(texts, None)
                    .map_err(|err| Error::retrieval(format!("embedding failed: {err}")))
            })
            .await
            .map_err(|err| Error::retrieval(format!("embedding task failed: {err}")))?
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One axis per keyword, counting its occurrences.
    fn keywords(words: &'static [&'static str]) -> Arc<dyn Embedder> {
        Arc::new(move |text: &str| -> Vec<f32> {
            words.iter().map(|w| text.matches(w).count() as f32).collect()
        })
    }

    #[test]
    fn passages_are_fixed_word_windows() {
        let passages = split_passages("a b c d e f g", 3).unwrap();
        assert_eq!(passages, vec!["a b c", "d e f", "g"]);
        assert!(split_passages("a b", 0).is_err());
    }

    #[tokio::test]
    async fn empty_corpus() {
        let retriever = CorpusRetriever::from_text("  \n ", 10, keywords(&["a"]))
            .await
            .unwrap();
        assert!(retriever.is_empty());
        assert!(retriever.retrieve("a", 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn nearest_passages_first() {
        let corpus = "rust ownership borrow \
                      python garbage collector \
                      rust borrow checker lifetimes";
        let embedder = keywords(&["rust", "python", "borrow", "checker"]);
        let retriever = CorpusRetriever::from_text(corpus, 3, embedder).await.unwrap();
        assert_eq!(retriever.len(), 3);
        let hits = retriever.retrieve("borrow checker", 2).await.unwrap();
        assert_eq!(hits, vec!["rust borrow checker", "rust ownership borrow"]);
    }

    #[tokio::test]
    async fn always_returns_top_k() {
        let embedder = keywords(&["宝玉", "黛玉", "宝钗"]);
        let retriever = CorpusRetriever::from_text("宝玉 宝玉宝钗 黛玉", 1, embedder)
            .await
            .unwrap();
        // no shared keyword: the nearest passages are still returned
        let hits = retriever.retrieve("weather", 2).await.unwrap();
        assert_eq!(hits, vec!["宝玉", "黛玉"]);
        let hits = retriever.retrieve("黛玉是谁", 1).await.unwrap();
        assert_eq!(hits, vec!["黛玉"]);
        assert_eq!(retriever.retrieve("x", 10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn ties_keep_corpus_order() {
        let retriever =
            CorpusRetriever::from_text("cat one cat two cat three", 2, keywords(&["cat"]))
                .await
                .unwrap();
        let hits = retriever.retrieve("cat", 3).await.unwrap();
        assert_eq!(hits, vec!["cat one", "cat two", "cat three"]);
    }

    #[tokio::test]
    async fn mismatched_embedder_is_a_retrieval_error() {
        let short: Arc<dyn Embedder> = Arc::new(|text: &str| vec![text.len() as f32; text.len()]);
        let err = CorpusRetriever::from_text("a bb", 1, short).await.unwrap_err();
        assert!(matches!(err, Error::Retrieval { .. }));
    }

    #[tokio::test]
    async fn missing_corpus_file() {
        let err = CorpusRetriever::from_path("/nonexistent/corpus.txt", 10, keywords(&["a"]))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Retrieval { .. }));
    }
}
