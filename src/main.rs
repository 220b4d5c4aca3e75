use std::sync::Arc;

use biostudy::remote::chatgpt::ChatGptModel;
use biostudy::remote::gemini::GeminiModel;
use biostudy::{
    Backend, Config, CredentialStore, Difficulty, FileCredentialStorage, GenerativeModel,
    MindMapNode, Quiz, StudyGenerator,
};
use dotenv::dotenv;
use log::debug;
use tokio::io::{AsyncBufReadExt, BufReader};

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

const USAGE: &str = "Usage:
  biostudy key set <token> | key clear | key status
  biostudy quiz <notes-file> [easy|medium|hard] [count]
  biostudy mindmap <notes-file>
  biostudy study <notes-file> <diagram-topic>
  biostudy explain <notes-file>
  biostudy diagram <topic> [out-file]";

const DEFAULT_QUESTION_COUNT: usize = 5;

#[tokio::main]
async fn main() -> HandlerResult {
    // A missing .env is fine, the variables may come from the real environment.
    let _ = dotenv();

    pretty_env_logger::init();

    let config = Config::from_env()?;
    debug!("Using {:?} backend", config.backend);

    let credentials = Arc::new(CredentialStore::initialize(
        config.api_key.clone(),
        Box::new(FileCredentialStorage::new(&config.credential_file)),
    ));

    let model: Arc<dyn GenerativeModel> = match config.backend {
        Backend::Gemini => Arc::new(GeminiModel::new(&config.api_base, config.timeout)?),
        Backend::ChatGpt => Arc::new(ChatGptModel::new(config.timeout)),
    };

    let generator = StudyGenerator::new(model, credentials.clone(), config.generator.clone());

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    match args.as_slice() {
        ["key", "set", token] => {
            credentials.set_credential(token)?;
            println!("API key saved.");
        }
        ["key", "clear"] => {
            credentials.clear_credential();
            println!("API key removed.");
        }
        ["key", "status"] => {
            if credentials.has_credential() {
                println!("An API key is configured.");
            } else {
                println!("No API key configured. Run `biostudy key set <token>`.");
            }
        }
        ["quiz", notes, rest @ ..] => {
            let difficulty = match rest.first() {
                Some(difficulty) => difficulty.parse()?,
                None => Difficulty::default(),
            };
            let count = match rest.get(1) {
                Some(count) => count.parse()?,
                None => DEFAULT_QUESTION_COUNT,
            };
            run_quiz(&generator, notes, difficulty, count).await?;
        }
        ["mindmap", notes] => {
            let notes = tokio::fs::read_to_string(notes).await?;
            let root = generator.generate_mind_map(&notes).await?;
            print_mind_map(&root);
        }
        ["study", notes, topic] => {
            let notes = tokio::fs::read_to_string(notes).await?;
            let (root, diagram) = tokio::join!(
                generator.generate_mind_map(&notes),
                generator.generate_diagram(topic)
            );
            print_mind_map(&root?);
            match diagram {
                Some(uri) => println!("\nDiagram: {} bytes of image data", uri.len()),
                None => println!("\nDiagram unavailable."),
            }
        }
        ["explain", notes] => {
            let notes = tokio::fs::read_to_string(notes).await?;
            println!("{}", generator.generate_explanation(&notes).await?);
        }
        ["diagram", topic, rest @ ..] => match generator.generate_diagram(topic).await {
            Some(uri) => match rest.first() {
                Some(path) => {
                    tokio::fs::write(path, &uri).await?;
                    println!("Diagram data URI written to {}", path);
                }
                None => println!("{}", uri),
            },
            None => println!("Could not generate a diagram for {}.", topic),
        },
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}

async fn run_quiz(
    generator: &StudyGenerator,
    notes_path: &str,
    difficulty: Difficulty,
    count: usize,
) -> HandlerResult {
    let notes = tokio::fs::read_to_string(notes_path).await?;
    let mut quiz = Quiz::new(generator.generate_quiz(&notes, difficulty, count).await?);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(question) = quiz.current().cloned() {
        println!("\nQuestion {}: {}", quiz.current_question + 1, question.text);
        for (i, option) in question.options.iter().enumerate() {
            println!("  {}. {}", i + 1, option);
        }

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let choice = match line.trim().parse::<usize>() {
            Ok(choice) if choice > 0 => choice - 1,
            _ => {
                println!("Please enter the number of an option.");
                continue;
            }
        };

        match quiz.answer(choice) {
            Ok(outcome) if outcome.correct => println!("Correct!"),
            Ok(outcome) => {
                println!(
                    "Wrong! The answer was: {}",
                    question.options[outcome.correct_index]
                );
                if let Some(explanation) = outcome.explanation {
                    println!("{}", explanation);
                }
            }
            Err(e) => println!("{}", e),
        }
    }

    println!(
        "\nQuiz finished! You answered {} of {} questions correctly.",
        quiz.score,
        quiz.questions.len()
    );
    Ok(())
}

fn print_mind_map(root: &MindMapNode) {
    if root.is_error() {
        println!("{}", root.label);
        if let Some(details) = &root.details {
            println!("{}", details);
        }
        return;
    }
    print_node(root, 0);
}

fn print_node(node: &MindMapNode, depth: usize) {
    let indent = "  ".repeat(depth);
    match &node.details {
        Some(details) => println!("{}- {}: {}", indent, node.label, details),
        None => println!("{}- {}", indent, node.label),
    }
    for child in &node.children {
        print_node(child, depth + 1);
    }
}
