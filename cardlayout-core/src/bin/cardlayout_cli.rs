//! CardLayout CLI - Template editing and card export
//!
//! Commands: elements, show, set, reset, branding, preview, export
//! Outputs JSON to stdout, logs to stderr
//! Returns non-zero on failure

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cardlayout_core::{
    Branding, ConfigurationStore, DocumentScope, ElementKey, EngineConfig, ExportController,
    FileStore, KeyValueStore, LayoutEdit, OperatorRole, PdfExporter, RecordBook,
    RecordSource, Renderer, TemplateEditor,
};

/// Key the school profile is kept under, next to the template settings.
const BRANDING_KEY: &str = "school_profile";

#[derive(Parser)]
#[command(name = "cardlayout-cli")]
#[command(about = "CardLayout CLI - Visual Template Layout Engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding persisted settings
    #[arg(short, long, env = "CARDLAYOUT_STORE_DIR", default_value = ".cardlayout")]
    store_dir: PathBuf,

    /// Engine config file (JSON)
    #[arg(short, long, env = "CARDLAYOUT_CONFIG")]
    config: Option<PathBuf>,

    /// Operator role
    #[arg(short, long, value_enum, default_value_t = Role::Staff)]
    role: Role,
}

#[derive(Clone, Copy, ValueEnum)]
enum Role {
    Administrator,
    Staff,
}

impl From<Role> for OperatorRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Administrator => OperatorRole::Administrator,
            Role::Staff => OperatorRole::Staff,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List template elements with their current layout
    Elements,

    /// Print the persisted template settings
    Show,

    /// Edit one element (administrators only)
    Set {
        /// Element name, e.g. studentName
        #[arg(short, long)]
        element: String,

        /// JSON edit, e.g. {"op":"setScale","value":1.5}
        #[arg(short, long)]
        payload: String,
    },

    /// Restore the blueprint layout, or one element's (administrators only)
    Reset {
        #[arg(short, long)]
        element: Option<String>,
    },

    /// Update the school profile (JSON Branding)
    Branding {
        #[arg(short, long)]
        payload: String,
    },

    /// Render one record's card as a JSON tree
    Preview {
        /// Records file (JSON array)
        #[arg(long)]
        records: PathBuf,

        #[arg(long)]
        student: String,
    },

    /// Export a student's or a whole class's cards to PDF
    Export {
        #[arg(long)]
        records: PathBuf,

        #[arg(long, conflicts_with = "class", required_unless_present = "class")]
        student: Option<String>,

        #[arg(long)]
        class: Option<String>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
}

fn emit<T: Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(&format!("Failed to encode output: {e}"), 1),
    }
}

fn fail(message: &str, code: u8) -> ExitCode {
    println!("{}", serde_json::json!({ "success": false, "error": message }));
    ExitCode::from(code)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cardlayout_core=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match EngineConfig::load_from_file(path) {
            Ok(c) => c,
            Err(e) => return fail(&e.to_string(), 1),
        },
        None => EngineConfig::default(),
    };

    let backend = FileStore::new(&cli.store_dir);
    let branding: Branding = backend.get_json(BRANDING_KEY, Branding::default());
    let store = ConfigurationStore::open_with(backend, &config.settings_key, config.validator(), &branding);
    let mut editor = TemplateEditor::new(store, cli.role.into())
        .with_renderer(Renderer::new(&config.placeholder))
        .with_document_type(config.document_type);

    match cli.command {
        Commands::Elements => {
            let elements: Vec<_> = ElementKey::ALL
                .iter()
                .map(|&key| {
                    serde_json::json!({
                        "key": key,
                        "label": key.label(),
                        "anchor": key.anchor(),
                        "layout": editor.settings().layout.get(key),
                    })
                })
                .collect();
            emit(&elements)
        }

        Commands::Show => emit(editor.settings()),

        Commands::Set { element, payload } => {
            let edit: LayoutEdit = match serde_json::from_str(&payload) {
                Ok(e) => e,
                Err(e) => return fail(&format!("Invalid payload: {e}"), 1),
            };
            if !editor.enter_design() {
                return fail("Design mode requires the administrator role", 2);
            }
            if !editor.select_named(&element) {
                return fail(&format!("Unknown element: {element}"), 2);
            }
            let changed = editor.apply_edit(edit);
            let key = editor.mode().selected();
            editor.exit_design();
            emit(&serde_json::json!({
                "success": true,
                "changed": changed,
                "element": key,
                "layout": key.map(|k| editor.settings().layout.get(k).clone()),
                "notices": editor.drain_notices(),
            }))
        }

        Commands::Reset { element } => {
            if !editor.enter_design() {
                return fail("Design mode requires the administrator role", 2);
            }
            let changed = match element {
                Some(name) => {
                    if !editor.select_named(&name) {
                        return fail(&format!("Unknown element: {name}"), 2);
                    }
                    editor.reset_element()
                }
                None => editor.reset_to_blueprint(),
            };
            editor.exit_design();
            emit(&serde_json::json!({
                "success": true,
                "changed": changed,
                "notices": editor.drain_notices(),
            }))
        }

        Commands::Branding { payload } => {
            let branding: Branding = match serde_json::from_str(&payload) {
                Ok(b) => b,
                Err(e) => return fail(&format!("Invalid payload: {e}"), 1),
            };
            let mut profile = FileStore::new(&cli.store_dir);
            if !profile.set_json(BRANDING_KEY, &branding) {
                return fail("School profile could not be saved", 1);
            }
            editor.on_branding_change(&branding);
            emit(&serde_json::json!({
                "success": true,
                "identity": editor.settings().identity,
                "notices": editor.drain_notices(),
            }))
        }

        Commands::Preview { records, student } => {
            let book = match RecordBook::load_from_file(&records) {
                Ok(b) => b,
                Err(e) => return fail(&format!("Failed to load records: {e}"), 1),
            };
            match book.find(&student) {
                Some(record) => emit(&editor.preview(record)),
                None => fail(&format!("Unknown student: {student}"), 2),
            }
        }

        Commands::Export { records, student, class, out } => {
            let book = match RecordBook::load_from_file(&records) {
                Ok(b) => b,
                Err(e) => return fail(&format!("Failed to load records: {e}"), 1),
            };
            let scope = match (student, class) {
                (Some(record_id), _) => DocumentScope::Single { record_id },
                (None, Some(class_name)) => DocumentScope::Class { class_name },
                (None, None) => return fail("Pass --student or --class", 1),
            };
            let selected = book.resolve_scope(&scope);
            let subject = match &scope {
                DocumentScope::Single { .. } => selected.first().map(|r| r.name.clone()).unwrap_or_default(),
                DocumentScope::Class { class_name } => format!("Class {class_name}"),
            };
            editor.set_scope(scope);

            let options = match config.export_options(&subject, selected.len()) {
                Ok(o) => o,
                Err(e) => return fail(&e.to_string(), 1),
            };
            let controller = ExportController::new(PdfExporter::new());
            let receipt = match editor.export(&controller, &selected, &options).await {
                Ok(r) => r,
                Err(e) => {
                    error!(error = %e, "export did not complete");
                    return emit_failure(e.to_string(), editor.drain_notices());
                }
            };

            let path = out.join(&receipt.file.filename);
            let bytes = match base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &receipt.file.data_base64) {
                Ok(b) => b,
                Err(e) => return fail(&format!("Corrupt export payload: {e}"), 1),
            };
            if let Err(e) = std::fs::write(&path, bytes) {
                return fail(&format!("Failed to write {}: {e}", path.display()), 1);
            }
            info!(path = %path.display(), "export written");

            emit(&serde_json::json!({
                "success": true,
                "path": path,
                "id": receipt.id,
                "pages": receipt.page_count,
                "sizeBytes": receipt.file.size_bytes,
                "hash": receipt.file.hash,
                "documentFingerprint": receipt.document_fingerprint,
                "exportHash": receipt.export_hash,
                "notices": editor.drain_notices(),
            }))
        }
    }
}

fn emit_failure(error: String, notices: Vec<cardlayout_core::Notice>) -> ExitCode {
    println!("{}", serde_json::json!({ "success": false, "error": error, "notices": notices }));
    ExitCode::from(2)
}
