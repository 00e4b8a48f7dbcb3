//! Quizcorpus CLI
//!
//! Command-line interface for ingestion, retrieval and quiz generation.
//! Every command prints one JSON document on stdout; logs go to stderr.

use anyhow::{anyhow, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use quizcorpus_lib::quiz::service::encode_image;
use quizcorpus_lib::{
    build_embedder, parse_mcq, ChatCompletionsClient, Config, Corpus, CorpusError, EvaluationRequest,
    ImageRecord, IngestResult, QuizRequest, QuizService, SubjectFilter,
};

#[derive(Parser)]
#[command(name = "quizcorpus-cli")]
#[command(about = "Quizcorpus CLI - question corpus and quiz tools", long_about = None)]
struct Cli {
    /// JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy a PDF into the documents directory and ingest it
    Ingest {
        /// Path to the PDF
        file: PathBuf,
    },
    /// Clear the corpus and re-ingest every PDF in the documents directory
    Rebuild,
    /// Nearest question segments to a query
    Search {
        query: String,
        /// Subject filter (physics, chemistry, mathematics, biology, all)
        #[arg(short, long, default_value = "all")]
        subject: SubjectFilter,
        #[arg(short, default_value = "5")]
        k: usize,
    },
    /// First question segments for a subject
    Filter {
        subject: SubjectFilter,
        #[arg(short, default_value = "10")]
        k: usize,
    },
    /// Associated figures for the questions nearest to a query
    Associated {
        query: String,
        #[arg(short, long, default_value = "all")]
        subject: SubjectFilter,
        #[arg(short, default_value = "5")]
        k: usize,
        /// Embed the image as a data URL
        #[arg(long)]
        inline: bool,
    },
    /// Corpus counts
    Stats,
    /// Subjects present in the corpus
    Subjects,
    /// Generate a multiple-choice quiz
    Quiz {
        #[arg(short, long, default_value = "all")]
        subject: SubjectFilter,
        #[arg(short, long)]
        topic: Option<String>,
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,
    },
    /// Parse generated MCQ text
    ParseMcq {
        /// Text to parse (or - to read from stdin)
        text: String,
    },
    /// Grade answers from a JSON payload {questions, userAnswers}
    Evaluate {
        /// Payload file (or - to read from stdin)
        payload: String,
    },
}

// ============ Output Types ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AssociatedOutput {
    question_id: String,
    question: String,
    distance: f32,
    image: Option<ImageRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct SubjectsOutput {
    subjects: Vec<String>,
}

#[derive(Serialize)]
struct ErrorOutput {
    error: String,
}

// ============ Main ============

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = Config::load(cli.config.as_deref())
        .map_err(anyhow::Error::from)
        .and_then(|config| run(cli.command, &config));

    match result {
        Ok(json) => println!("{}", json),
        Err(e) => {
            let error = ErrorOutput { error: e.to_string() };
            println!(
                "{}",
                serde_json::to_string(&error).unwrap_or_else(|_| r#"{"error": "unknown"}"#.to_string())
            );
            std::process::exit(1);
        }
    }
}

fn run(command: Commands, config: &Config) -> anyhow::Result<String> {
    match command {
        Commands::ParseMcq { text } => Ok(serde_json::to_string(&parse_mcq(&read_arg(text)?))?),

        Commands::Evaluate { payload } => {
            let content = if payload == "-" {
                read_arg(payload)?
            } else {
                fs::read_to_string(&payload).map_err(|e| anyhow!("Failed to read {}: {}", payload, e))?
            };
            let request: EvaluationRequest = serde_json::from_str(&content)?;
            Ok(serde_json::to_string(&request.evaluate()?)?)
        }

        Commands::Ingest { file } => {
            let corpus = open_corpus(config)?;
            let result = ingest_upload(&corpus, &file, &config.paths.documents_dir)?;
            Ok(serde_json::to_string(&result)?)
        }

        Commands::Rebuild => {
            let corpus = open_corpus(config)?;
            Ok(serde_json::to_string(&corpus.rebuild_from_dir(&config.paths.documents_dir)?)?)
        }

        Commands::Search { query, subject, k } => {
            let corpus = rebuilt_corpus(config)?;
            Ok(serde_json::to_string(&corpus.retrieve_scored(&query, subject, k)?)?)
        }

        Commands::Filter { subject, k } => {
            let corpus = rebuilt_corpus(config)?;
            Ok(serde_json::to_string(&corpus.filter_by_subject(subject, k))?)
        }

        Commands::Associated { query, subject, k, inline } => {
            let corpus = rebuilt_corpus(config)?;
            let items: Vec<AssociatedOutput> = corpus
                .retrieve_scored(&query, subject, k)?
                .into_iter()
                .map(|hit| {
                    let image = corpus.find_associated_image(&hit.segment.id);
                    let (image_data, error) = match (&image, inline) {
                        (Some(img), true) => match encode_image(img) {
                            Ok(data) => (Some(data), None),
                            Err(e) => (None, Some(format!("Could not encode image: {}", e))),
                        },
                        _ => (None, None),
                    };
                    AssociatedOutput {
                        question_id: hit.segment.id,
                        question: hit.segment.text,
                        distance: hit.distance,
                        image,
                        image_data,
                        error,
                    }
                })
                .collect();
            Ok(serde_json::to_string(&items)?)
        }

        Commands::Stats => {
            let corpus = rebuilt_corpus(config)?;
            Ok(serde_json::to_string(&corpus.stats())?)
        }

        Commands::Subjects => {
            let corpus = rebuilt_corpus(config)?;
            let output = SubjectsOutput {
                subjects: corpus.subjects().iter().map(|s| s.to_string()).collect(),
            };
            Ok(serde_json::to_string(&output)?)
        }

        Commands::Quiz { subject, topic, count } => {
            let generator = ChatCompletionsClient::from_config(&config.generation)?;
            let corpus = Arc::new(rebuilt_corpus(config)?);
            let service = QuizService::new(corpus, Arc::new(generator), config.generation.max_questions);
            let quiz = service.generate(&QuizRequest { subject, topic, count })?;
            Ok(serde_json::to_string(&quiz)?)
        }
    }
}

// ============ Helpers ============

fn open_corpus(config: &Config) -> anyhow::Result<Corpus> {
    let embedder = build_embedder(&config.embedding)?;
    Ok(Corpus::new(config, embedder))
}

/// The corpus lives in memory, so read commands rebuild it first. A
/// document that fails to ingest is logged; the documents before it are
/// still served.
fn rebuilt_corpus(config: &Config) -> anyhow::Result<Corpus> {
    let corpus = open_corpus(config)?;
    match corpus.rebuild_from_dir(&config.paths.documents_dir) {
        Ok(_) => {}
        Err(e @ CorpusError::Document { .. }) => {
            warn!(error = %e, "Rebuild stopped early, serving partial corpus")
        }
        Err(e) => return Err(e.into()),
    }
    Ok(corpus)
}

/// Copy `file` into the documents directory and ingest it. A copy whose
/// ingestion fails is removed again so later rebuilds never see it.
fn ingest_upload(corpus: &Corpus, file: &Path, documents_dir: &Path) -> anyhow::Result<IngestResult> {
    let (stored, copied) = store_upload(file, documents_dir)?;
    match corpus.ingest_file(&stored) {
        Ok(result) => Ok(result),
        Err(e) => {
            if copied {
                if let Err(remove) = fs::remove_file(&stored) {
                    warn!(path = %stored.display(), error = %remove, "Failed to remove rejected upload");
                }
            }
            Err(e.into())
        }
    }
}

/// Copy `file` into the documents directory unless it is already there.
/// Returns the stored path and whether a copy was made.
fn store_upload(file: &Path, documents_dir: &Path) -> anyhow::Result<(PathBuf, bool)> {
    let name = match file.file_name() {
        Some(name) => name,
        None => bail!("Not a file: {}", file.display()),
    };
    fs::create_dir_all(documents_dir)?;
    let target = documents_dir.join(name);
    let same = match (file.canonicalize(), target.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    };
    if same {
        return Ok((target, false));
    }
    fs::copy(file, &target).map_err(|e| anyhow!("Failed to copy {}: {}", file.display(), e))?;
    Ok((target, true))
}

fn read_arg(text: String) -> anyhow::Result<String> {
    if text == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quizcorpus_lib::Subject;

    fn pdf(lines: &[&str]) -> Vec<u8> {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Document, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("TL", vec![20.into()]),
            Operation::new("Td", vec![72.into(), 700.into()]),
        ];
        for line in lines {
            operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
            operations.push(Operation::new("T*", vec![]));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn test_config(root: &Path) -> Config {
        let mut config = Config::default();
        config.paths.documents_dir = root.join("docs");
        config.paths.images_dir = root.join("images");
        config
    }

    #[test]
    fn test_rejected_upload_is_not_kept() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        let corpus = open_corpus(&config).unwrap();

        let good = root.path().join("good.pdf");
        fs::write(&good, pdf(&["Physics", "1. What is the SI unit of force and how is it measured?"])).unwrap();
        let broken = root.path().join("broken.pdf");
        fs::write(&broken, b"not a pdf").unwrap();

        ingest_upload(&corpus, &good, &config.paths.documents_dir).unwrap();
        assert!(ingest_upload(&corpus, &broken, &config.paths.documents_dir).is_err());

        assert!(config.paths.documents_dir.join("good.pdf").exists());
        assert!(!config.paths.documents_dir.join("broken.pdf").exists());
        assert!(broken.exists());
    }

    #[test]
    fn test_read_commands_survive_broken_document() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        let docs = &config.paths.documents_dir;
        fs::create_dir_all(docs).unwrap();
        fs::write(docs.join("a.pdf"), pdf(&["Physics", "1. What is the SI unit of force and how is it measured?"])).unwrap();
        fs::write(docs.join("b.pdf"), b"not a pdf").unwrap();

        let corpus = rebuilt_corpus(&config).unwrap();
        assert_eq!(corpus.subjects(), vec![Subject::Physics]);
        assert_eq!(corpus.stats().question_count, 1);

        let json = run(Commands::Stats, &config).unwrap();
        assert!(json.contains("\"questionCount\":1"));
    }

    #[test]
    fn test_pdf_error_printed_once() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        let broken = root.path().join("broken.pdf");
        fs::write(&broken, b"not a pdf").unwrap();

        let err = run(Commands::Ingest { file: broken }, &config).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("PDF error: "), "{}", message);
        assert!(!message.contains("PDF error: PDF error"), "{}", message);
    }
}
