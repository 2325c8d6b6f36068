//! # copyscan
//!
//! Code plagiarism detection. A corpus of code files is flattened out of
//! repositories, stripped of comments, docstrings and imports, embedded into
//! fixed-size vectors and indexed for exact nearest-neighbour search. A
//! submission is normalized the same way, matched against the corpus, and the
//! closest files are handed to an LLM for a yes/no verdict.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌───────────┐   ┌─────────────┐
//! │ extract  │──▶│  process  │──▶│   embed   │──▶│ CorpusIndex │
//! │ repos    │   │ normalize │   │ (batches) │   │ (flat L2)   │
//! └──────────┘   └───────────┘   └───────────┘   └──────┬──────┘
//!                                                       │
//!                 submission ─▶ normalize ─▶ embed ─▶ top-K ─▶ LLM verdict
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! copyscan extract                # flatten ./repos into the raw corpus
//! copyscan process                # normalize the raw corpus
//! copyscan index build            # embed and write the index
//! copyscan check submission.py    # search + verdict
//! copyscan serve                  # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`normalize`] | Comment, docstring and import stripping |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Flat L2 index and its on-disk artifacts |
//! | [`search`] | Top-K similarity search |
//! | [`llm`] | Chat-completions backend |
//! | [`verdict`] | Prompt construction and verdict parsing |
//! | [`checker`] | End-to-end check that never fails |
//! | [`extract`] | Repository flattening |
//! | [`corpus`] | Corpus processing and content lookup |
//! | [`indexer`] | Batch index build |
//! | [`server`] | HTTP API |
//! | [`evaluate`] | Accuracy on labelled samples |

pub mod checker;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod evaluate;
pub mod extract;
pub mod index;
pub mod indexer;
pub mod llm;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod search;
pub mod server;
pub mod verdict;
