use clap::{Parser, Subcommand};
use lesson_core::config::DataConfig;
use lesson_core::*;
use std::path::{Path, PathBuf};

type AppTracker = Tracker<JsonSettingsStore, FsBlobStore>;

#[derive(Parser)]
#[command(name = "lessons")]
#[command(about = "Track listening progress through a library of audio lessons", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List lessons in display order (default)
    List {
        /// Include completed lessons even when they are hidden
        #[arg(long)]
        all: bool,

        /// Group lessons under their collections
        #[arg(long)]
        grouped: bool,
    },

    /// Import audio files as lessons
    Add {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Duration in seconds, when known
        #[arg(long)]
        duration: Option<f64>,

        /// Put the new lessons in this collection
        #[arg(long)]
        collection: Option<String>,
    },

    /// Add a lesson that streams from a URL
    AddUrl {
        url: String,

        #[arg(long)]
        name: String,

        #[arg(long, default_value_t = 0.0)]
        duration: f64,
    },

    /// Record a listening session for a lesson
    Listen {
        /// Lesson name or id
        lesson: String,

        /// Position reached, in seconds
        #[arg(long)]
        to: Option<f64>,

        /// Duration reported by the player, in seconds
        #[arg(long)]
        duration: Option<f64>,

        /// Listen to the end
        #[arg(long)]
        finish: bool,

        /// Playback rate to use
        #[arg(long)]
        rate: Option<f64>,

        /// Accept an offered review of the previous lesson
        #[arg(long, conflicts_with = "skip_review")]
        review: bool,

        /// Decline an offered review
        #[arg(long)]
        skip_review: bool,
    },

    /// Flip a lesson between completed and not completed
    Toggle { lesson: String },

    /// Delete a lesson and its stored audio
    Delete { lesson: String },

    /// Delete every lesson
    DeleteAll {
        #[arg(long)]
        yes: bool,
    },

    /// Rewind every lesson to the start
    Reset {
        #[arg(long)]
        yes: bool,
    },

    /// Manage collections
    #[command(subcommand)]
    Collection(CollectionCommand),

    /// Show or change the daily streak
    Streak {
        #[command(subcommand)]
        action: Option<StreakCommand>,
    },

    /// Show or change settings
    Settings {
        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        theme: Option<String>,

        #[arg(long)]
        review_mode: Option<bool>,

        #[arg(long)]
        hide_completed: Option<bool>,

        #[arg(long)]
        collections_view: Option<bool>,

        #[arg(long)]
        play_on_navigate: Option<bool>,

        #[arg(long)]
        completion_sound: Option<String>,
    },

    /// Set or clear the custom artwork
    #[command(subcommand)]
    Artwork(ArtworkCommand),

    /// Write a backup file
    Export {
        /// Directory to write into
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// Merge a backup file into the current state
    Import { file: PathBuf },

    /// Write a CSV progress report
    Report {
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum CollectionCommand {
    /// Create a collection
    Create { name: String },
    /// Rename a collection
    Rename { collection: String, name: String },
    /// Delete a collection; its lessons become uncategorized
    Delete { collection: String },
    /// Move a lesson into a collection, or out of any when omitted
    Move {
        lesson: String,
        collection: Option<String>,
    },
}

#[derive(Subcommand)]
enum StreakCommand {
    Enable,
    Disable,
    /// easy, normal, hard or extreme
    Difficulty { level: Difficulty },
}

#[derive(Subcommand)]
enum ArtworkCommand {
    Set { file: PathBuf },
    Clear,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    lesson_core::logging::init_with_level(if cli.verbose { "debug" } else { "warn" });

    let config = Config::load()?;
    let data_dir = cli
        .data_dir
        .unwrap_or_else(|| config.data.data_dir.clone());
    tracing::debug!("Using data directory {:?}", data_dir);
    let mut tracker = open_tracker(&data_dir, &config)?;

    let outcome = run(&mut tracker, cli.command);
    let notices = tracker.shutdown()?;
    for notice in notices {
        eprintln!("warning: {}", notice.message);
    }
    outcome
}

fn open_tracker(data_dir: &Path, config: &Config) -> Result<AppTracker> {
    let data = DataConfig {
        data_dir: data_dir.to_path_buf(),
    };
    let store = JsonSettingsStore::open(data.settings_path())?;
    let blobs = FsBlobStore::open(data.blob_dir())?;
    let tracker = Tracker::open(store, blobs, Box::new(SystemClock), &config.playback)
        .with_intent_log(IntentLog::new(data.intent_log_path()));
    Ok(tracker)
}

fn run(tracker: &mut AppTracker, command: Option<Commands>) -> Result<()> {
    match command.unwrap_or(Commands::List {
        all: false,
        grouped: false,
    }) {
        Commands::List { all, grouped } => cmd_list(tracker, all, grouped),
        Commands::Add {
            files,
            duration,
            collection,
        } => cmd_add(tracker, &files, duration, collection.as_deref()),
        Commands::AddUrl {
            url,
            name,
            duration,
        } => {
            if tracker.add_static(&url, &name, duration) {
                println!("✓ Added {}", name);
            } else {
                println!("{} is already in the library", name);
            }
            Ok(())
        }
        Commands::Listen {
            lesson,
            to,
            duration,
            finish,
            rate,
            review,
            skip_review,
        } => cmd_listen(
            tracker,
            &lesson,
            ListenOptions {
                to,
                duration,
                finish,
                rate,
                review,
                skip_review,
            },
        ),
        Commands::Toggle { lesson } => {
            let id = resolve_lesson(tracker, &lesson)?;
            match tracker.toggle_completion(&id) {
                Some(true) => println!("✓ Marked {} completed", lesson),
                Some(false) => println!("Marked {} not completed", lesson),
                None => {}
            }
            print_streak_line(tracker);
            Ok(())
        }
        Commands::Delete { lesson } => {
            let id = resolve_lesson(tracker, &lesson)?;
            tracker.delete_lesson(&id);
            println!("✓ Deleted {}", lesson);
            Ok(())
        }
        Commands::DeleteAll { yes } => {
            require_confirmation(yes, "delete every lesson")?;
            let removed = tracker.delete_all();
            println!("✓ Deleted {} lessons", removed);
            Ok(())
        }
        Commands::Reset { yes } => {
            require_confirmation(yes, "reset all progress")?;
            tracker.reset_progress();
            println!("✓ Progress reset");
            Ok(())
        }
        Commands::Collection(action) => cmd_collection(tracker, action),
        Commands::Streak { action } => cmd_streak(tracker, action),
        Commands::Settings {
            title,
            theme,
            review_mode,
            hide_completed,
            collections_view,
            play_on_navigate,
            completion_sound,
        } => {
            let changed = title.is_some()
                || theme.is_some()
                || review_mode.is_some()
                || hide_completed.is_some()
                || collections_view.is_some()
                || play_on_navigate.is_some()
                || completion_sound.is_some();
            if changed {
                tracker.update_settings(|s| {
                    if let Some(title) = title {
                        s.app_title = title;
                    }
                    if let Some(theme) = theme {
                        s.theme = theme;
                    }
                    if let Some(v) = review_mode {
                        s.review_mode_enabled = v;
                    }
                    if let Some(v) = hide_completed {
                        s.hide_completed = v;
                    }
                    if let Some(v) = collections_view {
                        s.use_collections_view = v;
                    }
                    if let Some(v) = play_on_navigate {
                        s.play_on_navigate = v;
                    }
                    if let Some(sound) = completion_sound {
                        s.completion_sound = sound;
                    }
                });
            }
            print_settings(tracker.settings());
            Ok(())
        }
        Commands::Artwork(ArtworkCommand::Set { file }) => {
            let bytes = std::fs::read(&file)?;
            if tracker.set_custom_artwork(&bytes) {
                println!("✓ Artwork set ({} bytes)", bytes.len());
            }
            Ok(())
        }
        Commands::Artwork(ArtworkCommand::Clear) => {
            tracker.clear_custom_artwork();
            println!("✓ Artwork cleared");
            Ok(())
        }
        Commands::Export { out } => {
            let path = tracker.export_to(&out)?;
            println!("✓ Exported to {}", path.display());
            Ok(())
        }
        Commands::Import { file } => {
            let summary = tracker.import_file(&file)?;
            println!(
                "✓ Imported: {} lessons updated, {} not in library",
                summary.lessons_updated, summary.lessons_ignored
            );
            if summary.collections_replaced {
                println!("  Collections replaced");
            }
            Ok(())
        }
        Commands::Report { out } => {
            let count = lesson_core::report::write_report(tracker.library(), &out)?;
            println!("✓ Wrote {} lessons to {}", count, out.display());
            Ok(())
        }
    }
}

fn cmd_list(tracker: &AppTracker, all: bool, grouped: bool) -> Result<()> {
    let settings = tracker.settings();
    let library = tracker.library();
    let hide_completed = settings.hide_completed && !all;

    println!("{}", settings.app_title);
    if library.lessons().is_empty() {
        println!("No lessons yet. Add some with `lessons add <FILES>`.");
        return Ok(());
    }

    if grouped || settings.use_collections_view {
        for (collection, lessons) in library.grouped(hide_completed) {
            let heading = collection.map_or("Uncategorized", |c| c.name.as_str());
            println!("\n{} ({})", heading, lessons.len());
            for lesson in lessons {
                println!("  {}", format_lesson(lesson));
            }
        }
    } else {
        for lesson in library.visible(hide_completed) {
            println!("{}", format_lesson(lesson));
        }
    }
    Ok(())
}

fn cmd_add(
    tracker: &mut AppTracker,
    files: &[PathBuf],
    duration: Option<f64>,
    collection: Option<&str>,
) -> Result<()> {
    let collection_id = collection
        .map(|name| resolve_collection(tracker, name))
        .transpose()?;

    let outcome = tracker.add_files(files, &DeclaredDuration(duration));
    for id in &outcome.added {
        if let Some(collection_id) = &collection_id {
            tracker.move_to_collection(id, Some(collection_id));
        }
    }

    println!("✓ Added {} lessons", outcome.added.len());
    if outcome.duplicates > 0 {
        println!("  {} already in the library", outcome.duplicates);
    }
    if outcome.dropped > 0 {
        println!("  {} could not be read", outcome.dropped);
    }
    Ok(())
}

struct ListenOptions {
    to: Option<f64>,
    duration: Option<f64>,
    finish: bool,
    rate: Option<f64>,
    review: bool,
    skip_review: bool,
}

fn cmd_listen(tracker: &mut AppTracker, query: &str, opts: ListenOptions) -> Result<()> {
    let id = resolve_lesson(tracker, query)?;
    if let Some(position) = opts.to {
        playback::validate_position(position)?;
    }
    if let Some(duration) = opts.duration {
        playback::validate_position(duration)?;
    }
    let mut player = HeadlessPlayer::default();

    if let Some(rate) = opts.rate {
        tracker.set_playback_rate(rate, &mut player);
    }

    match tracker.select_lesson(&id, &mut player) {
        Selection::ReviewOffered(offer) => {
            let review_name = lesson_name(tracker, &offer.review);
            if opts.review {
                tracker.confirm_review(&mut player);
                println!("Reviewing {} first", review_name);
            } else if opts.skip_review {
                tracker.skip_review(&mut player);
            } else {
                println!(
                    "Review {} before {}? Re-run with --review or --skip-review.",
                    review_name,
                    lesson_name(tracker, &offer.target)
                );
                return Ok(());
            }
        }
        Selection::NotFound => {
            return Err(Error::Other(format!("Lesson not found: {}", query)));
        }
        Selection::Started(_) | Selection::Toggled { .. } => {}
    }

    if let Some(duration) = opts.duration {
        tracker.on_loaded(duration, &mut player);
    }
    if let Some(position) = opts.to {
        tracker.on_time_update(position);
        tracker.pause(&mut player);
    }
    let listened = tracker.playback().active().map(str::to_string);
    let next = if opts.finish {
        tracker.on_ended(&mut player)
    } else {
        None
    };

    if let Some(lesson) = listened.as_deref().and_then(|id| tracker.library().get(id)) {
        println!("{}", format_lesson(lesson));
    }
    if let Some(next) = next {
        println!("Up next: {}", lesson_name(tracker, &next));
    }
    print_streak_line(tracker);
    Ok(())
}

fn cmd_collection(tracker: &mut AppTracker, action: CollectionCommand) -> Result<()> {
    match action {
        CollectionCommand::Create { name } => match tracker.create_collection(&name) {
            Some(collection) => println!("✓ Created {} ({})", collection.name, collection.id),
            None => return Err(Error::Other("Collection name cannot be empty".into())),
        },
        CollectionCommand::Rename { collection, name } => {
            let id = resolve_collection(tracker, &collection)?;
            if !tracker.rename_collection(&id, &name) {
                return Err(Error::Other("Collection name cannot be empty".into()));
            }
            println!("✓ Renamed {} to {}", collection, name.trim());
        }
        CollectionCommand::Delete { collection } => {
            let id = resolve_collection(tracker, &collection)?;
            let moved = tracker.delete_collection(&id).unwrap_or(0);
            println!("✓ Deleted {} ({} lessons now uncategorized)", collection, moved);
        }
        CollectionCommand::Move { lesson, collection } => {
            let lesson_id = resolve_lesson(tracker, &lesson)?;
            let collection_id = collection
                .as_deref()
                .map(|name| resolve_collection(tracker, name))
                .transpose()?;
            tracker.move_to_collection(&lesson_id, collection_id.as_deref());
            match collection {
                Some(name) => println!("✓ Moved {} to {}", lesson, name),
                None => println!("✓ Moved {} to Uncategorized", lesson),
            }
        }
    }
    Ok(())
}

fn cmd_streak(tracker: &mut AppTracker, action: Option<StreakCommand>) -> Result<()> {
    match action {
        Some(StreakCommand::Enable) => tracker.update_settings(|s| s.streak.enabled = true),
        Some(StreakCommand::Disable) => tracker.update_settings(|s| s.streak.enabled = false),
        Some(StreakCommand::Difficulty { level }) => {
            tracker.update_settings(|s| s.streak.set_difficulty(level))
        }
        None => {}
    }

    let summary = tracker.streak_summary();
    if !summary.enabled {
        println!("Streak tracking is off");
        return Ok(());
    }
    println!("Streak: {} days", summary.current_streak);
    println!("Difficulty: {:?}", summary.difficulty);
    println!(
        "Today: {}/{} lessons{}",
        summary.completed_today.min(summary.goal),
        summary.goal,
        if summary.today_complete { " ✓" } else { "" }
    );
    let recent: Vec<String> = summary.recent.iter().map(|d| clock::iso_date(*d)).collect();
    if !recent.is_empty() {
        println!("Last 7 days: {}", recent.join(", "));
    }
    Ok(())
}

fn print_streak_line(tracker: &AppTracker) {
    let summary = tracker.streak_summary();
    if summary.enabled {
        println!("Streak: {} days", summary.current_streak);
    }
}

fn print_settings(settings: &AppSettings) {
    println!("Title: {}", settings.app_title);
    println!("Theme: {}", settings.theme);
    println!("Review mode: {}", on_off(settings.review_mode_enabled));
    println!("Hide completed: {}", on_off(settings.hide_completed));
    println!("Collections view: {}", on_off(settings.use_collections_view));
    println!("Play on navigate: {}", on_off(settings.play_on_navigate));
    println!("Completion sound: {}", settings.completion_sound);
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

fn format_lesson(lesson: &Lesson) -> String {
    let mark = if lesson.is_completed { "[x]" } else { "[ ]" };
    let progress = if lesson.duration_seconds > 0.0 {
        format!(
            "{} / {}",
            format_time(lesson.progress_seconds),
            format_time(lesson.duration_seconds)
        )
    } else {
        format_time(lesson.progress_seconds)
    };
    format!("{} {}  {}", mark, lesson.name, progress)
}

fn format_time(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

fn lesson_name(tracker: &AppTracker, id: &str) -> String {
    tracker
        .library()
        .get(id)
        .map_or_else(|| id.to_string(), |l| l.name.clone())
}

fn resolve_lesson(tracker: &AppTracker, query: &str) -> Result<LessonId> {
    tracker
        .library()
        .find(query)
        .map(|l| l.id.clone())
        .ok_or_else(|| Error::Other(format!("Lesson not found: {}", query)))
}

fn resolve_collection(tracker: &AppTracker, query: &str) -> Result<String> {
    tracker
        .library()
        .find_collection(query)
        .map(|c| c.id.clone())
        .ok_or_else(|| Error::Other(format!("Collection not found: {}", query)))
}

fn require_confirmation(yes: bool, action: &str) -> Result<()> {
    if yes {
        Ok(())
    } else {
        Err(Error::Other(format!("Refusing to {} without --yes", action)))
    }
}
