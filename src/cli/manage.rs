use std::sync::Arc;

use ansi_term::Colour;
use anyhow::{bail, Result};
use clap::Subcommand;

use crate::{
    assign::{
        matcher::{match_calendar_event, match_domain, match_repository, Assignment},
        rules::ProjectId,
    },
    daemon::{
        processing::assigner::reapply_assignments,
        storage::{observation_log::ObservationLogImpl, rule_store::RuleStore},
        OBSERVATION_DIR,
    },
    secret::SecretStore,
    settings::{JsonSettingsStore, SettingsStore},
    utils::dir::create_application_default_path,
};

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    #[command(about = "Create a new project")]
    Add { name: String },
    #[command(about = "List projects together with their rules")]
    List {},
    #[command(about = "Remove a project and every rule pointing at it")]
    Remove { id: u64 },
}

#[derive(Subcommand, Debug)]
pub enum RuleCommand {
    #[command(about = "Assign visits of a domain (and its subdomains) to a project")]
    Domain {
        #[arg(long)]
        project: u64,
        pattern: String,
    },
    #[command(about = "Assign calendar events containing a keyword to a project")]
    Keyword {
        #[arg(long)]
        project: u64,
        pattern: String,
    },
    #[command(about = "Assign activity in an owner/repo repository to a project")]
    Repository {
        #[arg(long)]
        project: u64,
        pattern: String,
    },
    #[command(about = "List every rule in creation order")]
    List {},
    #[command(about = "Remove the rule with the given sequence number")]
    Remove { seq: u64 },
}

#[derive(Subcommand, Debug)]
pub enum ResolveCommand {
    #[command(about = "Resolve a browsed domain")]
    Domain { domain: String },
    #[command(about = "Resolve a calendar event")]
    Event {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    #[command(about = "Resolve an owner/repo repository")]
    Repository { repository: String },
}

#[derive(Subcommand, Debug)]
pub enum TokenCommand {
    #[command(about = "Encrypt and store a scanner token")]
    Set { name: String, value: String },
    #[command(about = "Decrypt and print a stored scanner token")]
    Show { name: String },
}

pub fn process_project_command(command: ProjectCommand) -> Result<()> {
    let store = open_rule_store()?;
    match command {
        ProjectCommand::Add { name } => {
            let project = store.add_project(&name)?;
            println!("Created project {} with id {}", project.name, project.id);
        }
        ProjectCommand::List {} => {
            let book = store.load()?;
            for project in &book.projects {
                println!(
                    "{}\t{}",
                    project.id,
                    Colour::Cyan.paint(project.name.as_ref())
                );
                for rule in book.rules.domains.iter().filter(|r| r.project == project.id) {
                    println!("  #{}\tdomain\t{}", rule.seq, rule.domain);
                }
                for rule in book.rules.keywords.iter().filter(|r| r.project == project.id) {
                    println!("  #{}\tkeyword\t{}", rule.seq, rule.keyword);
                }
                for rule in book
                    .rules
                    .repositories
                    .iter()
                    .filter(|r| r.project == project.id)
                {
                    println!("  #{}\trepository\t{}", rule.seq, rule.repository);
                }
            }
        }
        ProjectCommand::Remove { id } => {
            let project = store.remove_project(ProjectId(id))?;
            println!("Removed project {}", project.name);
            println!("Stored observations still reference it, run `whereabouts reassign` to clear them");
        }
    }
    Ok(())
}

pub fn process_rule_command(command: RuleCommand) -> Result<()> {
    let store = open_rule_store()?;
    match command {
        RuleCommand::Domain { project, pattern } => {
            let rule = store.add_domain_rule(ProjectId(project), &pattern)?;
            println!("Created domain rule #{}", rule.seq);
            print_reassign_hint();
        }
        RuleCommand::Keyword { project, pattern } => {
            let rule = store.add_keyword_rule(ProjectId(project), &pattern)?;
            println!("Created keyword rule #{}", rule.seq);
            print_reassign_hint();
        }
        RuleCommand::Repository { project, pattern } => {
            let rule = store.add_repository_rule(ProjectId(project), &pattern)?;
            println!("Created repository rule #{}", rule.seq);
            print_reassign_hint();
        }
        RuleCommand::List {} => {
            let book = store.load()?;
            let mut rows = Vec::new();
            for rule in &book.rules.domains {
                rows.push((rule.seq, "domain", rule.domain.clone(), rule.project));
            }
            for rule in &book.rules.keywords {
                rows.push((rule.seq, "keyword", rule.keyword.clone(), rule.project));
            }
            for rule in &book.rules.repositories {
                rows.push((rule.seq, "repository", rule.repository.clone(), rule.project));
            }
            rows.sort_by_key(|(seq, ..)| *seq);
            for (seq, kind, pattern, project) in rows {
                println!("#{seq}\t{kind}\t{pattern}\t-> {}", book.project_name(project));
            }
        }
        RuleCommand::Remove { seq } => {
            if !store.remove_rule(seq)? {
                bail!("No rule with sequence number {seq}");
            }
            println!("Removed rule #{seq}");
            print_reassign_hint();
        }
    }
    Ok(())
}

pub fn process_resolve_command(command: ResolveCommand) -> Result<()> {
    let store = open_rule_store()?;
    let book = store.load()?;

    let resolved = match command {
        ResolveCommand::Domain { domain } => match_domain(&domain, &book.rules.domains),
        ResolveCommand::Event { title, description } => {
            match_calendar_event(&title, &description, &book.rules.keywords)
        }
        ResolveCommand::Repository { repository } => {
            match_repository(&repository, &book.rules.repositories)
        }
    };

    match resolved {
        Some(Assignment { project, matched }) => {
            println!(
                "{} (rule \"{matched}\")",
                Colour::Cyan.paint(book.project_name(project))
            );
        }
        None => println!("no match"),
    }
    Ok(())
}

pub async fn process_reassign() -> Result<()> {
    let application_path = create_application_default_path()?;
    let store = RuleStore::open(&application_path)?;
    let log = ObservationLogImpl::new(application_path.join(OBSERVATION_DIR))?;

    let changed = reapply_assignments(&log, &store.snapshot()?).await?;
    println!("Updated {changed} observations");
    Ok(())
}

pub fn process_token_command(command: TokenCommand) -> Result<()> {
    let settings: Arc<dyn SettingsStore> =
        Arc::new(JsonSettingsStore::open(&create_application_default_path()?)?);
    let secrets = SecretStore::new(Some(settings.clone()));

    match command {
        TokenCommand::Set { name, value } => {
            let envelope = secrets.encrypt(&value)?;
            settings.set(&token_key(&name), &envelope);
            settings.flush()?;
            println!("Stored token {name}");
        }
        TokenCommand::Show { name } => {
            let Some(envelope) = settings.get(&token_key(&name)) else {
                bail!("No token named {name}");
            };
            println!("{}", secrets.decrypt(&envelope)?);
        }
    }
    Ok(())
}

fn token_key(name: &str) -> String {
    format!("token.{name}")
}

fn print_reassign_hint() {
    println!("Run `whereabouts reassign` to update already stored observations");
}

fn open_rule_store() -> Result<RuleStore> {
    RuleStore::open(&create_application_default_path()?)
}
