//! CLI front end over the library: `build` runs the ingest pipeline,
//! `query` runs one query against a committed index, `stats` prints
//! collection-level numbers. This binary owns logger initialization and
//! error-to-exit-code translation; the library itself never touches
//! stdout/stderr or a logger.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use rayon::prelude::*;

use ixcore::analysis::analyzer::Analyzer;
use ixcore::build::merger;
use ixcore::build::rundumper;
use ixcore::build::{Accumulator, DocumentParser};
use ixcore::core::config::{
    BuildConfig, LoadConfig, SearchConfig, Similarity, Stemmer as StemmerOpt, SummaryType,
};
use ixcore::core::error::{Error, Result};
use ixcore::core::stats::Parameters;
use ixcore::core::types::DocmapCachePolicy;
use ixcore::docmap::{Docmap, DocmapBuilder};
use ixcore::fdset::FdSet;
use ixcore::iobtree::IoBtreeConfig;
use ixcore::query::parser::QueryParser;
use ixcore::query::planner::{apply_modifiers, PlanOutcome, QueryPlanner};
use ixcore::query::types::ParserEvent;
use ixcore::ranker::Ranker;
use ixcore::repository::Repository;
use ixcore::vocab::{PostingList, Vocab};

const VOCAB_TYPE: u32 = 1;
const VECTOR_TYPE: u32 = 2;
const REPO_TYPE: u32 = 3;
const DOCMAP_TYPE: u32 = 4;
const RUN_TYPE: u32 = 5;
const FD_LIMIT: usize = 256;

#[derive(Parser)]
#[command(name = "search-engine", about = "disk-resident inverted-index search engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build or extend an index.
    Build(BuildArgs),
    /// Run one query against a committed index.
    Query(QueryArgs),
    /// Print collection statistics.
    Stats(StatsArgs),
}

#[derive(clap::Args)]
struct BuildArgs {
    /// Index root prefix `P`; files are written as `P.<suffix>.<n>`.
    #[arg(short = 'i', long = "new")]
    new: bool,
    #[arg(short = 'a', long = "append")]
    append: bool,
    index_root: PathBuf,
    /// Source files to ingest, in addition to any `--file-list`.
    sources: Vec<PathBuf>,
    #[arg(long)]
    file_list: Option<PathBuf>,
    #[arg(long, value_enum, default_value = "none")]
    stem: StemArg,
    #[arg(long)]
    build_stop: Option<PathBuf>,
    #[arg(long)]
    anh_impact: bool,
    #[arg(long)]
    big_and_fast: bool,
    #[arg(short = 'm', long = "accumulation-memory", default_value_t = 64 * 1024 * 1024)]
    accumulation_memory: usize,
    #[arg(long, default_value_t = 16 * 1024 * 1024)]
    dump_memory: usize,
    #[arg(long, default_value_t = 64 * 1024)]
    parse_buffer: usize,
    #[arg(long, default_value_t = 1 << 20)]
    tablesize: usize,
    #[arg(long, default_value_t = 2 * 1024 * 1024 * 1024)]
    max_file_size: u64,
}

#[derive(Copy, Clone, ValueEnum)]
enum StemArg {
    None,
    Eds,
    Light,
    Porters,
}

impl From<StemArg> for StemmerOpt {
    fn from(s: StemArg) -> Self {
        match s {
            StemArg::None => StemmerOpt::None,
            StemArg::Eds => StemmerOpt::Eds,
            StemArg::Light => StemmerOpt::Light,
            StemArg::Porters => StemmerOpt::Porters,
        }
    }
}

#[derive(clap::Args)]
struct QueryArgs {
    index_root: PathBuf,
    query: Vec<String>,
    #[arg(short = 'n', long, default_value_t = 20)]
    n: usize,
    #[arg(short = 'b', long = "begin", default_value_t = 0)]
    begin: usize,
    #[arg(long, value_enum, default_value = "none")]
    summary: SummaryArg,
    #[arg(long)]
    okapi: bool,
    #[arg(long, default_value_t = 1.2)]
    k1: f64,
    #[arg(long, default_value_t = 1e10)]
    k3: f64,
    /// BM25's `b` length-normalization parameter (long-only: `-b` is
    /// already the begin-offset flag in this grammar).
    #[arg(long = "bval", default_value_t = 0.75)]
    bval: f64,
    #[arg(long)]
    cosine: bool,
    #[arg(long)]
    pivoted_cosine: Option<f64>,
    #[arg(long)]
    dirichlet: Option<f64>,
    #[arg(long)]
    hawkapi: Option<f64>,
    #[arg(long)]
    anh_impact: bool,
    #[arg(long, default_value_t = 20_000)]
    accumulator_limit: usize,
    #[arg(long, default_value_t = 1024)]
    word_limit: usize,
    /// `"default"` selects the compiled-in stoplist; any other value is a
    /// path to a custom one; omitted disables query-time stopping.
    #[arg(long)]
    query_stop: Option<String>,
    #[arg(long)]
    query_list: Option<PathBuf>,
    #[arg(long)]
    ignore_version: bool,
}

#[derive(Copy, Clone, ValueEnum)]
enum SummaryArg {
    None,
    Plain,
    Capitalise,
    Tag,
}

impl From<SummaryArg> for SummaryType {
    fn from(s: SummaryArg) -> Self {
        match s {
            SummaryArg::None => SummaryType::None,
            SummaryArg::Plain => SummaryType::Plain,
            SummaryArg::Capitalise => SummaryType::Capitalise,
            SummaryArg::Tag => SummaryType::Tag,
        }
    }
}

#[derive(clap::Args)]
struct StatsArgs {
    #[arg(short = 's')]
    _s: bool,
    index_root: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Build(args) => run_build(args),
        Command::Query(args) => run_query(args),
        Command::Stats(args) => run_stats(args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn params_path(index_root: &Path) -> PathBuf {
    PathBuf::from(format!("{}.params", index_root.display()))
}

fn template(index_root: &Path, suffix: &str) -> String {
    format!("{}.{}.%u", index_root.display(), suffix)
}

// ---------------------------------------------------------------- build --

fn run_build(args: BuildArgs) -> Result<()> {
    if args.new == args.append {
        return Err(Error::invalid_argument("exactly one of -i/--new or -a/--append is required"));
    }

    let config = BuildConfig {
        index_root: args.index_root.clone(),
        append: args.append,
        file_list: args.file_list.clone(),
        stemmer: args.stem.into(),
        build_stop: args.build_stop.clone(),
        anh_impact: args.anh_impact,
        big_and_fast: args.big_and_fast,
        accumulation_memory: args.accumulation_memory,
        dump_memory: args.dump_memory,
        parse_buffer: args.parse_buffer,
        tablesize: args.tablesize,
        max_file_size: args.max_file_size,
        ..BuildConfig::default()
    };

    let stop_words = match &config.build_stop {
        Some(path) => Some(read_word_list(path)?),
        None => None,
    };
    let analyzer = Analyzer::for_build(config.stemmer, stop_words.clone());
    let parser = DocumentParser::new(analyzer);

    let fdset = FdSet::new(FD_LIMIT);
    fdset.register_type(RUN_TYPE, &template(&config.index_root, "runs"), true)?;
    fdset.register_type(DOCMAP_TYPE, &template(&config.index_root, "docmap"), true)?;
    let vocab_template = template(&config.index_root, "vocab");
    let vector_template = template(&config.index_root, "vector");
    let repo_template = template(&config.index_root, "repos");

    let (vocab, mut docmap_builder, repository, mut stats, mut next_docno, append_vector_fileno) = if config.append {
        let prior_bytes = fs::read(params_path(&config.index_root)).map_err(Error::from)?;
        let params = Parameters::from_bytes(&prior_bytes, false)?;
        fdset.register_type(VOCAB_TYPE, &vocab_template, true)?;
        let vocab = Vocab::open(&fdset, VOCAB_TYPE, 0, VECTOR_TYPE, IoBtreeConfig::default())?;
        fdset.register_type(VECTOR_TYPE, &vector_template, true)?;
        let docmap = Docmap::load(&fdset, DOCMAP_TYPE, 0, DocmapCachePolicy::Both)?;
        let next_docno = docmap.len();
        let repository = Repository::open_existing(
            fdset.clone(),
            REPO_TYPE,
            &repo_template,
            config.max_file_size,
            params.repo_last_fileno,
            params.repo_last_offset,
        )?;
        let vector_fileno = params.vector_next_fileno.max(1);
        (vocab, DocmapBuilder::from_existing(docmap.into_entries()), repository, params.stats, next_docno, vector_fileno)
    } else {
        fdset.register_type(VOCAB_TYPE, &vocab_template, true)?;
        let vocab = Vocab::create(&fdset, VOCAB_TYPE, 0, VECTOR_TYPE, IoBtreeConfig::default())?;
        fdset.register_type(VECTOR_TYPE, &vector_template, true)?;
        let repository = Repository::create(fdset.clone(), REPO_TYPE, &repo_template, config.max_file_size)?;
        (vocab, DocmapBuilder::new(), repository, ixcore::core::stats::CollectionStats::default(), 0, 1)
    };

    let mut sources = args.sources.clone();
    if let Some(list) = &config.file_list {
        let f = fs::File::open(list).map_err(Error::from)?;
        for line in io::BufReader::new(f).lines() {
            let line = line.map_err(Error::from)?;
            if !line.trim().is_empty() {
                sources.push(PathBuf::from(line.trim()));
            }
        }
    }
    if sources.is_empty() {
        return Err(Error::invalid_argument("no source files given"));
    }

    // Parsing and tokenizing each source file is independent work; fan it
    // out with rayon, but keep the per-file order so docno assignment
    // below stays deterministic (invariant 5: build determinism).
    let parsed: Vec<Vec<ixcore::build::parser::ParsedDocument>> = sources
        .par_iter()
        .map(|path| -> Result<Vec<ixcore::build::parser::ParsedDocument>> {
            let bytes = fs::read(path).map_err(Error::from)?;
            let fallback_id = path.file_stem().and_then(|s| s.to_str()).unwrap_or("doc").to_string();
            Ok(parser.parse_source(&bytes, &fallback_id))
        })
        .collect::<Result<Vec<_>>>()?;

    let effective_budget = if config.big_and_fast {
        config.accumulation_memory.saturating_mul(2)
    } else {
        config.accumulation_memory
    };
    let mut accumulator = Accumulator::new(effective_budget, u32::MAX);
    let mut run_count = 0u32;

    for docs in parsed {
        for doc in docs {
            let docno = next_docno;
            accumulator.note_document();
            for token in &doc.tokens {
                accumulator.record_posting(&token.text, docno);
            }
            let pointer = repository.append(&doc.body)?;
            docmap_builder.push(ixcore::docmap::DocmapEntry {
                external_id: doc.external_id,
                repo_pointer: pointer,
                length: doc.tokens.len() as u32,
                weight: 1.0,
                mime: doc.mime,
                aux: None,
            });
            stats.record_document(doc.tokens.len() as u32);
            next_docno += 1;

            if accumulator.should_dump() {
                let entries = accumulator.take_sorted();
                rundumper::dump_run(&fdset, RUN_TYPE, run_count, &entries)?;
                run_count += 1;
            }
        }
    }
    if !accumulator.is_empty() {
        let entries = accumulator.take_sorted();
        rundumper::dump_run(&fdset, RUN_TYPE, run_count, &entries)?;
        run_count += 1;
    }

    let mut runs = Vec::with_capacity(run_count as usize);
    for fileno in 0..run_count {
        runs.push(rundumper::read_run(&fdset, RUN_TYPE, fileno)?);
    }

    if config.append {
        let vector_fd = fdset.create(VECTOR_TYPE, append_vector_fileno)?;
        let raw = merger::merge_runs_raw(runs)?;
        for (term, mut postings) in raw {
            if let Some((_, prior_list)) = vocab.postings(&term)? {
                let mut prior_postings = match prior_list {
                    PostingList::Docwp(p) => p,
                    PostingList::Impact(groups) => merger::flatten_impact_groups(&groups),
                };
                prior_postings.append(&mut postings);
                postings = prior_postings;
            }
            let merged = merger::finalize_term(
                &fdset,
                append_vector_fileno,
                &vector_fd,
                term,
                postings,
                config.inline_threshold,
                config.anh_impact,
            )?;
            vocab.insert_headers(&merged.term, &merged.headers)?;
        }
        fdset.unpin(&vector_fd)?;
    } else {
        let merged = merger::merge_runs(&fdset, VECTOR_TYPE, 0, runs, config.inline_threshold, config.anh_impact)?;
        vocab.insert_merged(&merged)?;
    }
    for fileno in 0..run_count {
        fdset.unlink(RUN_TYPE, fileno)?;
    }
    vocab.flush()?;

    let docmap = docmap_builder.into_docmap(DocmapCachePolicy::Both);
    docmap.save(&fdset, DOCMAP_TYPE, 0)?;

    let mut params = Parameters::new(
        config.maxwordlen,
        config.max_file_size,
        config.stemmer,
        config.build_stop.as_ref().map(|p| p.display().to_string()),
        config.anh_impact,
        config.inline_threshold,
    );
    params.stats = stats;
    params.vocab_listsize = vocab.term_count() as usize;
    params.repo_last_fileno = repository.current_fileno();
    params.repo_last_offset = repository.current_offset();
    params.vector_next_fileno = if config.append { append_vector_fileno + 1 } else { 1 };
    params.build_stop_words = stop_words;
    fs::write(params_path(&config.index_root), params.to_bytes()?).map_err(Error::from)?;

    println!("indexed {} documents, {} terms", next_docno, params.vocab_listsize);
    Ok(())
}

fn read_word_list(path: &Path) -> Result<Vec<String>> {
    let f = fs::File::open(path).map_err(Error::from)?;
    let mut words = Vec::new();
    for line in io::BufReader::new(f).lines() {
        let line = line.map_err(Error::from)?;
        let word = line.trim();
        if !word.is_empty() {
            words.push(word.to_string());
        }
    }
    Ok(words)
}

// ---------------------------------------------------------------- query --

fn run_query(args: QueryArgs) -> Result<()> {
    let metric = resolve_metric(&args)?;

    let load = LoadConfig {
        ignore_version: args.ignore_version,
        docmap_cache: DocmapCachePolicy::Both,
        qstop: args.query_stop.as_ref().map(PathBuf::from),
        ..LoadConfig::default()
    };

    let search_config = SearchConfig {
        requested: args.n,
        start: args.begin,
        summary: args.summary.into(),
        metric,
        accumulator_limit: args.accumulator_limit,
        query_word_limit: args.word_limit,
        query_stop: args.query_stop.clone(),
        query_list: args.query_list.clone(),
        ..SearchConfig::default()
    };

    let params_bytes = fs::read(params_path(&args.index_root)).map_err(Error::from)?;
    let params = Parameters::from_bytes(&params_bytes, load.ignore_version)?;

    let fdset = FdSet::new(FD_LIMIT);
    fdset.register_type(DOCMAP_TYPE, &template(&args.index_root, "docmap"), false)?;
    fdset.register_type(VOCAB_TYPE, &template(&args.index_root, "vocab"), false)?;
    let vocab = Vocab::open(
        &fdset,
        VOCAB_TYPE,
        0,
        VECTOR_TYPE,
        IoBtreeConfig::default(),
    )?;
    fdset.register_type(VECTOR_TYPE, &template(&args.index_root, "vector"), false)?;
    let docmap = Docmap::load(&fdset, DOCMAP_TYPE, 0, load.docmap_cache)?;
    let repository = Repository::open_existing(
        fdset.clone(),
        REPO_TYPE,
        &template(&args.index_root, "repos"),
        params.max_file_size,
        params.repo_last_fileno,
        params.repo_last_offset,
    )?;
    let analyzer = Analyzer::for_build(params.stemmer, params.build_stop_words.clone());

    let query_stop_words = match args.query_stop.as_deref() {
        Some("default") => Some(
            ixcore::analysis::filters::stopword::StopWordFilter::english()
                .stop_words
                .into_iter()
                .collect(),
        ),
        Some(path) => Some(read_word_list(Path::new(path))?),
        None => None,
    };

    let parser = QueryParser::new(params.maxwordlen);
    let planner = QueryPlanner::new(&vocab, params.stemmer, query_stop_words, search_config.plan_capacity);

    let queries: Vec<String> = if let Some(list_path) = &args.query_list {
        io::BufReader::new(fs::File::open(list_path).map_err(Error::from)?)
            .lines()
            .collect::<io::Result<Vec<_>>>()
            .map_err(Error::from)?
    } else {
        vec![args.query.join(" ")]
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for query_text in queries {
        let (mut events, warnings) = parser.parse(&query_text);
        truncate_to_word_limit(&mut events, search_config.query_word_limit);
        if warnings.bits() != 0 {
            log::warn!("query {:?}: parser warnings {:#x}", query_text, warnings.bits());
        }

        match planner.plan(&events)? {
            PlanOutcome::CacheRequest(docno) => {
                stream_cache(&repository, &docmap, docno, &mut out)?;
            }
            PlanOutcome::Plan(mut plan) => {
                apply_modifiers(&mut plan, &events);
                let ranker = Ranker::new(&vocab, &docmap, &repository, &analyzer, &params.stats, &search_config);
                let results = ranker.search(&plan)?;
                for hit in &results.hits {
                    let label = hit.external_id.as_ref().map(|e| e.0.as_str()).unwrap_or("");
                    writeln!(out, "{}\t{}\t{:.6}", hit.docno, label, hit.score).map_err(Error::from)?;
                }
            }
        }
    }
    Ok(())
}

fn truncate_to_word_limit(events: &mut Vec<ParserEvent>, limit: usize) {
    let mut words = 0usize;
    let mut cut = events.len();
    for (i, event) in events.iter().enumerate() {
        let is_word = matches!(
            event,
            ParserEvent::Word(_) | ParserEvent::WordNoStop(_) | ParserEvent::WordExclude(_) | ParserEvent::PhraseWord(_)
        );
        if is_word {
            words += 1;
            if words > limit {
                cut = i;
                break;
            }
        }
    }
    events.truncate(cut);
    if !matches!(events.last(), Some(ParserEvent::Eof)) {
        events.push(ParserEvent::Eof);
    }
}

fn stream_cache(repository: &Repository, docmap: &Docmap, docno: u32, out: &mut impl Write) -> Result<()> {
    let pointer = docmap
        .repo_pointer(docno)
        .ok_or_else(|| Error::not_found(format!("no such document {}", docno)))?;
    let mut skip = 0u64;
    let mut buf = [0u8; 8192];
    loop {
        let n = repository.retrieve(pointer, skip, &mut buf)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n]).map_err(Error::from)?;
        skip += n as u64;
    }
    Ok(())
}

fn resolve_metric(args: &QueryArgs) -> Result<Similarity> {
    let chosen = [args.okapi, args.cosine, args.pivoted_cosine.is_some(), args.dirichlet.is_some(), args.hawkapi.is_some(), args.anh_impact]
        .iter()
        .filter(|b| **b)
        .count();
    if chosen > 1 {
        return Err(Error::invalid_argument("only one metric flag may be given"));
    }
    Ok(if args.cosine {
        Similarity::Cosine
    } else if let Some(pivot) = args.pivoted_cosine {
        Similarity::PivotedCosine { pivot }
    } else if let Some(mu) = args.dirichlet {
        Similarity::Dirichlet { mu }
    } else if let Some(alpha) = args.hawkapi {
        Similarity::Hawkapi { alpha }
    } else if args.anh_impact {
        Similarity::AnhImpact
    } else {
        Similarity::Okapi { k1: args.k1, k3: args.k3, b: args.bval }
    })
}

// ---------------------------------------------------------------- stats --

fn run_stats(args: StatsArgs) -> Result<()> {
    let params_bytes = fs::read(params_path(&args.index_root)).map_err(Error::from)?;
    let params = Parameters::from_bytes(&params_bytes, false)?;

    println!("documents:        {}", params.stats.doc_count);
    println!("total terms:      {}", params.stats.total_terms);
    println!("average doc len:  {:.2}", params.stats.avg_doc_length);
    println!("vocabulary size:  {}", params.vocab_listsize);
    println!("stemmer:          {:?}", params.stemmer);
    println!("impact-ordered:   {}", params.impact_ordered);
    Ok(())
}
