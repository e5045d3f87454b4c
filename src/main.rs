use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use docsmith::auth::Credential;
use docsmith::config::{self, Config};
use docsmith::content::ContentClient;
use docsmith::http::HttpApi;
use docsmith::model::{DocumentType, ProjectDraft, ProjectId, SectionId};
use docsmith::store::StoreClient;
use docsmith::workflow::{ProjectSession, Workflow};

#[derive(Debug, Parser)]
#[command(author, version, about = "Generate, refine and export AI-written documents")]
struct Args {
    /// Path to YAML config file
    #[arg(long, global = true, default_value = config::DEFAULT_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write an example config file
    InitConfig,
    /// List your projects, most recently updated first
    List,
    /// Suggest section titles for a topic
    Outline {
        topic: String,
        #[arg(long = "type", default_value = "word")]
        document_type: DocumentType,
    },
    /// Create a project with its (empty) sections
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        topic: String,
        #[arg(long = "type", default_value = "word")]
        document_type: DocumentType,
        /// Presentation template id (presentations only)
        #[arg(long)]
        template: Option<String>,
        /// Section title; repeat for each section, in order
        #[arg(long = "section")]
        sections: Vec<String>,
        /// Replace the given sections with a suggested outline
        #[arg(long)]
        outline: bool,
    },
    /// Show a project with its sections and feedback
    Show { project: String },
    /// Generate content for every empty section, in order
    Generate { project: String },
    /// Rewrite one section following an instruction
    Refine {
        project: String,
        section: String,
        instruction: String,
    },
    Like { project: String, section: String },
    Dislike { project: String, section: String },
    Comment {
        project: String,
        section: String,
        text: String,
    },
    /// Download the finished document
    Export {
        project: String,
        /// Output directory (defaults to export.output_dir)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if let Command::InitConfig = args.command {
        return init_config(&args.config);
    }

    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    let workflow = build_workflow(&cfg)?;

    if let Err(err) = run(&cfg, &workflow, args.command).await {
        if let Some(err) = err.downcast_ref::<docsmith::Error>() {
            if err.requires_reauth() {
                error!("sign in again and set {} (or api.token)", config::TOKEN_ENV);
            }
        }
        return Err(err);
    }
    Ok(())
}

fn init_config(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    std::fs::write(path, config::example())
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "example config written");
    Ok(())
}

fn build_workflow(cfg: &Config) -> Result<Workflow> {
    let credential = Credential::new(cfg.resolved_token());
    let api = HttpApi::new(&cfg.api.base_url, credential, cfg.timeout(), &cfg.api.user_agent)?;
    Ok(Workflow::new(
        Arc::new(ContentClient::new(api.clone())),
        Arc::new(StoreClient::new(api)),
        cfg.retry_policy(),
    ))
}

async fn run(cfg: &Config, workflow: &Workflow, command: Command) -> Result<()> {
    match command {
        Command::InitConfig => unreachable!("handled before config is loaded"),
        Command::List => {
            for p in workflow.list_projects().await? {
                let updated = p
                    .updated_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!("{}  {:<10}  {:<16}  {}", p.id, p.document_type, updated, p.title);
            }
        }
        Command::Outline {
            topic,
            document_type,
        } => {
            for (idx, item) in workflow
                .suggest_outline(&topic, document_type)
                .await?
                .iter()
                .enumerate()
            {
                println!("{:>2}. {}", idx + 1, item.title);
                if !item.description.is_empty() {
                    println!("    {}", item.description);
                }
            }
        }
        Command::Create {
            title,
            topic,
            document_type,
            template,
            sections,
            outline,
        } => {
            let mut draft = ProjectDraft::new(&title, &topic, document_type);
            draft.presentation_template = template;
            draft.section_titles = sections;
            if outline {
                let items = workflow.suggest_outline(&topic, document_type).await?;
                draft.apply_outline(&items);
            }
            let session = workflow.create_project(&draft).await?;
            println!("created project {}", session.project_id());
            print_session(&session);
        }
        Command::Show { project } => {
            let session = open(workflow, &project).await?;
            print_session(&session);
        }
        Command::Generate { project } => {
            let session = open(workflow, &project).await?;
            let result = session.generate_all().await;
            print_session(&session);
            let report = result?;
            println!("generated {} section(s)", report.generated.len());
        }
        Command::Refine {
            project,
            section,
            instruction,
        } => {
            let session = open(workflow, &project).await?;
            let refined = session
                .refine_section(&SectionId(section), &instruction)
                .await?;
            println!("{refined}");
        }
        Command::Like { project, section } => {
            let session = open(workflow, &project).await?;
            session.set_liked(&SectionId(section), true).await?;
        }
        Command::Dislike { project, section } => {
            let session = open(workflow, &project).await?;
            session.set_liked(&SectionId(section), false).await?;
        }
        Command::Comment {
            project,
            section,
            text,
        } => {
            let session = open(workflow, &project).await?;
            session.set_comment(&SectionId(section), &text).await?;
            println!("comment saved");
        }
        Command::Export { project, out } => {
            let session = open(workflow, &project).await?;
            let doc = session.export().await?;
            let dir = match out {
                Some(dir) => dir,
                None => {
                    cfg.ensure_dirs()?;
                    cfg.output_dir()
                }
            };
            let path = dir.join(&doc.file_name);
            write_atomically(&path, &doc.bytes).await?;
            println!("wrote {}", path.display());
        }
    }
    Ok(())
}

async fn open(workflow: &Workflow, project: &str) -> Result<ProjectSession> {
    let id = ProjectId(project.to_string());
    Ok(workflow.open_project(&id).await?)
}

/// Writes next to the target and renames, so an interrupted write leaves no file behind.
async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("part");
    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    if let Err(err) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err).with_context(|| format!("failed to move file to {}", path.display()));
    }
    Ok(())
}

fn print_session(session: &ProjectSession) {
    let project = session.project();
    println!(
        "{} [{}] {} ({})",
        project.id,
        session.status().as_str(),
        project.title,
        project.topic
    );
    for (idx, section) in project.sections.iter().enumerate() {
        let state = session
            .section_state(&section.id)
            .map(|s| s.as_str())
            .unwrap_or("unknown");
        let feedback = session.feedback(&section.id);
        let verdict = match feedback.as_ref().and_then(|f| f.is_liked) {
            Some(true) => " +1",
            Some(false) => " -1",
            None => "",
        };
        println!(
            "  {} {}: {} <{}> [{}]{}",
            project.document_type.section_noun(),
            idx + 1,
            section.title,
            section.id,
            state,
            verdict
        );
        if let Some(comment) = feedback.and_then(|f| f.comment).filter(|c| !c.is_empty()) {
            println!("    comment: {comment}");
        }
    }
}
