use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, bail, Context};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Input, Password};
use tracing_subscriber::EnvFilter;

mod acuity;
mod courses;
mod error;
mod filter;
mod remote;
mod server;
mod store;
mod utils;

use acuity::{models::AppointmentType, AcuityClient, Upstream};
use courses::{
    models::{hydrate, AssignmentMap, TutorId},
    CourseMap, MapOrigin, SyncContext,
};
use error::Error;
use filter::TimeWindow;
use remote::RemoteClient;
use server::{models::FileBlobStore, AppState};
use store::{
    models::{Credentials, RemoteConfig},
    FileStore,
};

#[derive(Parser)]
#[clap(version, about, long_about = None)]
struct Args {
    /// File keeping the credentials, remote settings and course list
    #[clap(long, env = "TUTORCAL_STORE", value_name = "FILE")]
    store: Option<PathBuf>,

    /// JSON course list used when nothing was saved yet
    #[clap(long, value_name = "FILE")]
    default_map: Option<PathBuf>,

    /// Shared course list URL, used until one is saved
    #[clap(long, env = "TUTORCAL_REMOTE_URL", value_name = "URL", default_value = "")]
    remote_default: String,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Save the Acuity credentials
    Credentials {
        #[clap(long)]
        user_id: Option<String>,

        #[clap(long)]
        api_key: Option<String>,
    },

    /// Show or change where the shared course list lives
    Remote {
        /// Endpoint of the course list service, empty to disable sync
        #[clap(long)]
        url: Option<String>,

        /// Sent as the Authorization header, i.e.: "Bearer xyz"
        #[clap(long)]
        token: Option<String>,
    },

    /// Manage which tutors teach which course
    Courses {
        #[clap(subcommand)]
        action: CourseAction,
    },

    /// Exchange the course list with the shared copy
    Sync {
        #[clap(subcommand)]
        direction: SyncDirection,
    },

    /// List the appointment types
    AppointmentTypes,

    /// List the tutors, filtered by course and availability
    Tutors {
        /// Only tutors teaching this course, repeat for several
        #[clap(short, long = "course", value_name = "COURSE")]
        courses: Vec<String>,

        /// Choose the courses interactively
        #[clap(short, long)]
        pick: bool,

        /// Only tutors free in one of these windows, i.e.: 2024-05-06,09:00,12:00
        #[clap(short, long = "window", value_name = "DATE,START,END")]
        windows: Vec<TimeWindow>,

        /// Appointment type used to check availability
        #[clap(short, long, value_name = "ID")]
        appointment_type: Option<u64>,

        /// Time zone the windows are written in
        #[clap(short, long, default_value = "UTC")]
        tz: String,
    },

    /// Run the shared course list service
    Serve {
        #[clap(long, default_value = "127.0.0.1:8787")]
        bind: SocketAddr,

        /// Directory where the course list is kept
        #[clap(long, default_value = "data")]
        data_dir: PathBuf,

        /// Secret required to replace the course list
        #[clap(long, env = "COURSE_API_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
}

#[derive(Subcommand)]
enum CourseAction {
    /// Show the courses and their tutors
    List,

    /// Add a course without tutors
    Add { name: String },

    /// Remove a course
    Remove {
        name: String,

        /// Don't ask for confirmation
        #[clap(short, long)]
        yes: bool,
    },

    /// Replace the tutors of a course, choose them interactively when none are given
    Assign { name: String, ids: Vec<TutorId> },
}

#[derive(Subcommand)]
enum SyncDirection {
    /// Replace the local course list with the shared one
    Pull,

    /// Replace the shared course list with the local one
    Push,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let default_level = match args.command {
        Command::Serve { .. } => "info",
        _ => "warn",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args).await {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let store = FileStore::new(args.store.unwrap_or_else(FileStore::default_path));
    let defaults = load_defaults(args.default_map.as_deref())?;
    let user_agent = utils::user_agent();

    let client = RemoteClient::new(&user_agent)?;
    let ctx = SyncContext {
        store: &store,
        client: &client,
        remote: RemoteConfig::load(&store, &args.remote_default)?,
    };
    tracing::debug!(store = %store.path().display(), remote = %ctx.remote.url, "configuration loaded");

    match args.command {
        Command::Credentials { user_id, api_key } => {
            let user_id = match user_id {
                Some(id) => id,
                None => Input::<String>::new()
                    .with_prompt("Acuity user ID")
                    .interact_text()?,
            };
            let api_key = match api_key {
                Some(key) => key,
                None => Password::new().with_prompt("Acuity API key").interact()?,
            };

            Credentials { user_id, api_key }.save(&store)?;
            println!("Saved!");
        }

        Command::Remote { url, token } => {
            if url.is_none() && token.is_none() {
                let url = if ctx.remote.is_enabled() {
                    ctx.remote.url.as_str()
                } else {
                    "(sync disabled)"
                };
                let token = if ctx.remote.token.is_empty() { "no" } else { "yes" };
                println!("URL: {url}\nToken set: {token}");
                return Ok(());
            }

            let remote = RemoteConfig::new(
                url.as_deref().unwrap_or(&ctx.remote.url),
                token.as_deref().unwrap_or(&ctx.remote.token),
            );
            remote.save(&store)?;
            println!("Remote settings saved.");
        }

        Command::Courses { action } => manage_courses(action, &ctx, defaults, &user_agent).await?,

        Command::Sync { direction } => run_sync(direction, &ctx, defaults).await?,

        Command::AppointmentTypes => {
            let acuity = AcuityClient::from_store(&store, &user_agent)?;
            let types = acuity.appointment_types().await?;

            let mut rows = vec![vec![
                "ID".to_owned(),
                "Name".to_owned(),
                "Category".to_owned(),
                "Minutes".to_owned(),
            ]];
            rows.extend(types.iter().map(|t| {
                vec![
                    t.id.to_string(),
                    t.name.clone(),
                    t.category.clone(),
                    t.duration.to_string(),
                ]
            }));
            println!("{}", utils::table(&rows));
        }

        Command::Tutors {
            mut courses,
            pick,
            windows,
            appointment_type,
            tz,
        } => {
            filter::check_windows(&windows)?;
            let time_zone: Tz = tz
                .parse()
                .map_err(|_| anyhow!("Unknown time zone: {tz}"))?;
            if !windows.is_empty() && appointment_type.is_none() {
                return Err(Error::validation("Missing appointment type.").into());
            }

            let acuity = AcuityClient::from_store(&store, &user_agent)?;
            let (map, _) = CourseMap::load(&ctx, defaults).await?;
            if pick {
                courses.extend(filter::pick_courses(&map)?);
            }

            println!("Loading tutors...");
            let calendars = acuity
                .calendars()
                .await
                .context("Error fetching tutors. Check the credentials.")?;
            let mut calendars = filter::calendars_for_courses(calendars, &map, &courses);

            if let Some(type_id) = appointment_type.filter(|_| !windows.is_empty()) {
                let appointment_type = find_appointment_type(&acuity, type_id).await?;

                println!("Checking availability...");
                calendars = filter::available_tutors(
                    &acuity,
                    calendars,
                    &windows,
                    &appointment_type,
                    time_zone,
                )
                .await;
            }

            let cards = utils::tutor_cards(&calendars, &map, acuity.owner());
            println!("{}", utils::display_tutors(&cards));
        }

        Command::Serve {
            bind,
            data_dir,
            token,
        } => {
            if token.as_deref().map_or(true, |t| t.trim().is_empty()) {
                tracing::warn!("COURSE_API_TOKEN is not set, every write will be refused");
            }

            let state = AppState::new(Arc::new(FileBlobStore::new(data_dir)), token);
            server::serve(bind, state).await?;
        }
    }

    Ok(())
}

async fn manage_courses(
    action: CourseAction,
    ctx: &SyncContext<'_, FileStore>,
    defaults: AssignmentMap,
    user_agent: &str,
) -> anyhow::Result<()> {
    let (mut map, origin) = CourseMap::load(ctx, defaults).await?;
    tracing::info!(?origin, "course list loaded");

    match action {
        CourseAction::List => {
            if origin == MapOrigin::Defaults && map.has_courses() {
                println!("Showing the built-in course list.");
            }
            println!("{}", utils::display_courses(&map));
        }

        CourseAction::Add { name } => {
            let course = map.add_course(&name)?;
            let status = map.commit(ctx).await?;
            println!("Added {course}. Assign tutors with `tutorcal courses assign`.\n{status}");
        }

        CourseAction::Remove { name, yes } => {
            let Some(course) = map.find_course_key(&name).map(str::to_owned) else {
                // Nothing to remove is still a success
                println!("Removed {}.", name.trim());
                return Ok(());
            };

            let confirmed = yes
                || Confirm::new()
                    .with_prompt(format!("Remove \"{course}\" from the course list?"))
                    .default(false)
                    .interact()?;
            if !confirmed {
                return Ok(());
            }

            map.remove_course(&course);
            let status = map.commit(ctx).await?;
            println!("Removed {course}.\n{status}");
        }

        CourseAction::Assign { name, ids } => {
            let ids = if ids.is_empty() {
                let acuity = AcuityClient::from_store(ctx.store, user_agent)?;
                let calendars = acuity.calendars().await?;
                filter::pick_tutors(&calendars, map.tutors_for(&name))?
            } else {
                ids
            };

            let count = ids.len();
            let course = map.set_course_tutors(&name, ids)?;
            let status = map.commit(ctx).await?;
            println!("Updated {course} with {count} tutor(s).\n{status}");
        }
    }

    Ok(())
}

async fn run_sync(
    direction: SyncDirection,
    ctx: &SyncContext<'_, FileStore>,
    defaults: AssignmentMap,
) -> anyhow::Result<()> {
    if !ctx.remote.is_enabled() {
        bail!("No remote URL configured, set one with `tutorcal remote --url`.");
    }

    match direction {
        SyncDirection::Pull => {
            let Some(payload) = ctx.client.fetch(&ctx.remote).await? else {
                bail!("The remote course list is not a JSON object.");
            };

            let map = CourseMap::from_value(&payload, defaults);
            map.save_local(ctx.store)?;
            println!("Pulled {} course(s).", map.courses().len());
        }

        SyncDirection::Push => {
            let (map, _) = CourseMap::load_local(ctx.store, defaults)?;
            ctx.client.push(map.courses(), &ctx.remote).await?;
            println!("Pushed {} course(s).", map.courses().len());
        }
    }

    Ok(())
}

/// Duration of the appointment type, one hour when it can't be found
async fn find_appointment_type(acuity: &AcuityClient, id: u64) -> anyhow::Result<AppointmentType> {
    let types = acuity.appointment_types().await?;

    Ok(types.into_iter().find(|t| t.id == id).unwrap_or_else(|| {
        tracing::warn!(id, "unknown appointment type, assuming one hour sessions");
        AppointmentType {
            id,
            name: String::new(),
            duration: 60,
            category: String::new(),
        }
    }))
}

fn load_defaults(path: Option<&Path>) -> anyhow::Result<AssignmentMap> {
    let Some(path) = path else {
        return Ok(AssignmentMap::new());
    };

    let raw = fs::read_to_string(path)
        .with_context(|| format!("Can't read default course list {}", path.display()))?;
    let value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;

    Ok(hydrate(&value, &AssignmentMap::new()))
}
