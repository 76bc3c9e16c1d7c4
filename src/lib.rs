pub mod analysis;
pub mod build;
pub mod codec;
pub mod core;
pub mod docmap;
pub mod fdset;
pub mod iobtree;
pub mod query;
pub mod ranker;
pub mod repository;
pub mod vocab;

/*
┌────────────────────────────────────────────────────────────────────────────────────────────┐
│                              DISK-RESIDENT INVERTED INDEX                                    │
└────────────────────────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────────────── RESOURCE LAYER ──────────────────────────────────────┐
│                                                                                               │
│  fdset::FdSet               pinnable fd pool, clock-approximation LRU, one process-wide cap  │
│  codec::{vbyte,list,header} varbyte ints, docwp/impact posting codecs, vector headers         │
│  iobtree::IoBtree            paged, prefix-compressed B+tree (term -> vector header)          │
│  repository::Repository      append-only, checksummed, size-rotated document byte store       │
│  docmap::{Docmap,DocmapBuilder}  per-document repo pointer / length / weight / external id    │
│                                                                                               │
└───────────────────────────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────────────── BUILD PIPELINE ──────────────────────────────────────┐
│                                                                                               │
│  build::parser::DocumentParser   MIME-sniffs and splits a source file into documents          │
│  analysis::Analyzer              tokenize -> lowercase -> stem? -> stopword?                  │
│  build::accumulator::Accumulator bounded in-memory term -> postings, dumps on memory pressure │
│  build::rundumper                writes/reads one sorted accumulator batch as a run file      │
│  build::merger::merge_runs       k-way merge of runs into vocab entries + the vector file      │
│  vocab::Vocab                    ties IoBtree + vector file together for both build and query  │
│                                                                                               │
└───────────────────────────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────────────── QUERY PIPELINE ──────────────────────────────────────┐
│                                                                                               │
│  query::parser::QueryParser      single-pass DFA: query string -> ParserEvent stream          │
│  query::planner::QueryPlanner    events -> QueryPlan (conjuncts, AND-folding, dedup, stops)    │
│  ranker::Ranker                  document-at-a-time / impact-ordered traversal, 5 similarity   │
│                                   measures, bounded accumulator table, top-k by score/docno     │
│                                                                                               │
└───────────────────────────────────────────────────────────────────────────────────────────────┘

Everything above the resource layer is stateless and reopened fresh per process; there is no
in-place update path and no shared in-memory index (see the CLI's `build`/`query`/`stats`
subcommands for the only entry points that tie these layers together).
*/
