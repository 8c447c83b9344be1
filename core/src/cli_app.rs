use crate::api::ApiClient;
use crate::config::Config;
use crate::error::BazaarError;
use crate::models::{ChatRoomSummary, Post};
use crate::store::LocalStore;
use crate::validation::{PostForm, RegistrationForm, SignInForm};
use colored::*;

/// Shared implementation of the `cli` binary: one REST command per invocation.
pub async fn run(args: Vec<String>) -> anyhow::Result<()> {
    let bin = args
        .first()
        .map(|s| s.as_str())
        .unwrap_or("bazaar-cli")
        .to_string();

    let (config, rest) = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let Some(command) = rest.first().cloned() else {
        print_usage(&bin);
        return Ok(());
    };
    let params = &rest[1..];

    std::fs::create_dir_all(&config.data_dir)?;
    let store = LocalStore::open(&config.data_dir)?;
    let client = ApiClient::new(&config, store)?;

    let outcome = match command.as_str() {
        "login" | "signup" => {
            if params.len() < 2 {
                eprintln!(
                    "{}",
                    format!("Usage: {} {} <phone> <password> [--agree]", bin, command).yellow()
                );
                return Ok(());
            }
            auth(&client, &command, params).await
        }
        "logout" => match client.logout() {
            Ok(true) => {
                println!("{} Signed out", "✓".green().bold());
                Ok(())
            }
            Ok(false) => {
                println!("{}", "Not signed in".yellow());
                Ok(())
            }
            Err(e) => Err(e),
        },
        "me" => show_profile(&client).await,
        "categories" => list_categories(&client).await,
        "latest" => {
            let limit = params
                .first()
                .and_then(|s| s.parse::<u32>().ok())
                .unwrap_or(10);
            client.latest_posts(limit).await.map(|p| print_posts(&p))
        }
        "category" | "search" | "author" => {
            if params.is_empty() {
                eprintln!(
                    "{}",
                    format!("Usage: {} {} <value>", bin, command).yellow()
                );
                return Ok(());
            }
            let value = params.join(" ");
            let posts = match command.as_str() {
                "category" => client.posts_by_category(&value).await,
                "search" => client.search_posts_by_name(&value).await,
                _ => client.posts_by_author(&value).await,
            };
            posts.map(|p| print_posts(&p))
        }
        "post" => {
            let Some(id) = params.first() else {
                eprintln!("{}", format!("Usage: {} post <id>", bin).yellow());
                return Ok(());
            };
            show_post(&client, id).await
        }
        "publish" => {
            if params.len() < 5 {
                eprintln!(
                    "{}",
                    format!(
                        "Usage: {} publish <name> <brand> <quantity> <category> <description...>",
                        bin
                    )
                    .yellow()
                );
                return Ok(());
            }
            publish(&client, params).await
        }
        "delete" => {
            let Some(id) = params.first() else {
                eprintln!("{}", format!("Usage: {} delete <id>", bin).yellow());
                return Ok(());
            };
            client.delete_post(id).await.map(|_| {
                println!("{} Request removed!", "✓".green().bold());
            })
        }
        "chats" => client.my_chats().await.map(|c| print_chats(&c)),
        "theme" => set_theme(client.store(), params.first().map(String::as_str)),
        _ => {
            eprintln!("{} Unknown command: {}", "✗".red().bold(), command.red());
            print_usage(&bin);
            return Ok(());
        }
    };

    if let Err(e) = outcome {
        tracing::error!("{} failed: {}", command, e);
        eprintln!("{} {}", "✗".red().bold(), e.user_message().red());
        std::process::exit(1);
    }
    Ok(())
}

fn print_usage(bin: &str) {
    println!("{}", "Bazaar CLI".bright_cyan().bold());
    println!();
    println!("{}", "Usage:".bright_white().bold());
    println!("  {} [--api-url <url>] [--data-dir <path>] <command> [args]", bin.cyan());
    println!();
    println!("{}", "Commands:".bright_white().bold());
    println!("  {} <phone> <password>             Sign in", "login".cyan());
    println!("  {} <phone> <password> --agree    Create an account", "signup".cyan());
    println!("  {}                                Forget the stored token", "logout".cyan());
    println!("  {}                                    Show your profile", "me".cyan());
    println!("  {}                            List categories", "categories".cyan());
    println!("  {} [limit]                        Latest requests", "latest".cyan());
    println!("  {} <name>                       Requests in a category", "category".cyan());
    println!("  {} <query>                        Search requests by name", "search".cyan());
    println!("  {} <email>                        Requests by author", "author".cyan());
    println!("  {} <id>                             Request details", "post".cyan());
    println!("  {} <name> <brand> <qty> <category> <description>", "publish".cyan());
    println!("  {} <id>                           Delete your request", "delete".cyan());
    println!("  {}                                 List your chats", "chats".cyan());
    println!("  {} [dark|light]                    Show or set the theme flag", "theme".cyan());
}

async fn auth(client: &ApiClient, command: &str, params: &[String]) -> crate::Result<()> {
    let phone_number = params[0].clone();
    let password = params[1].clone();

    if command == "login" {
        let credentials = SignInForm {
            phone_number,
            password,
        }
        .into_credentials()?;
        client.login(&credentials).await?;
    } else {
        let registration = RegistrationForm {
            phone_number,
            password,
            agreed: params.iter().any(|p| p == "--agree"),
        }
        .into_registration()?;
        client.signup(&registration).await?;
    }
    println!("{} Signed in", "✓".green().bold());
    Ok(())
}

async fn show_profile(client: &ApiClient) -> crate::Result<()> {
    let user = client.my_profile().await?;
    println!("{}", "Profile".bright_cyan().bold());
    println!("{}", "─".repeat(60).dimmed());
    println!("  ID:    {}", user.id.cyan());
    println!("  Name:  {}", user.name.as_deref().unwrap_or("-"));
    println!("  Email: {}", user.email.as_deref().unwrap_or("-"));
    println!("  Phone: {}", user.phone_number.as_deref().unwrap_or("-"));
    Ok(())
}

async fn list_categories(client: &ApiClient) -> crate::Result<()> {
    let categories = client.categories().await?;
    if categories.is_empty() {
        println!("{}", "No categories found".yellow());
    }
    for category in categories {
        println!("  {}", category.cyan());
    }
    Ok(())
}

fn print_posts(posts: &[Post]) {
    if posts.is_empty() {
        println!("{}", "No requests found".yellow());
        return;
    }
    println!("{}", format!("Requests ({})", posts.len()).bright_cyan().bold());
    println!("{}", "─".repeat(60).dimmed());
    for post in posts {
        println!(
            "  {} {} x{} [{}]",
            post.id.dimmed(),
            post.product_name.bright_white(),
            post.product_quantity,
            post.category.green()
        );
        if !post.product_description.is_empty() {
            println!("      {}", post.product_description);
        }
    }
}

async fn show_post(client: &ApiClient, id: &str) -> crate::Result<()> {
    let details = client.post_by_id(id).await?;
    let post = &details.post_details;
    println!("{}", post.product_name.bright_cyan().bold());
    println!("{}", "─".repeat(60).dimmed());
    println!("  Brand:    {}", post.product_company);
    println!("  Quantity: {}", post.product_quantity);
    println!("  Category: {}", post.category.green());
    if !post.tags.is_empty() {
        println!("  Tags:     {}", post.tags.join(", "));
    }
    println!("  Author:   {} ({})", post.author_email, details.author_details.id.dimmed());
    println!();
    println!("  {}", post.product_description);
    Ok(())
}

async fn publish(client: &ApiClient, params: &[String]) -> crate::Result<()> {
    let me = client.my_profile().await?;
    let author_email = me.email.ok_or_else(|| {
        BazaarError::Validation("your profile has no email address".to_string())
    })?;

    let form = PostForm {
        name: params[0].clone(),
        brand: params[1].clone(),
        quantity: params[2].clone(),
        category: params[3].clone(),
        description: params[4..].join(" "),
        ..Default::default()
    };
    let post = client.create_post(&form.into_new_post(author_email)?).await?;
    println!("{} Uploaded! ID: {}", "✓".green().bold(), post.id.cyan());
    Ok(())
}

fn print_chats(chats: &[ChatRoomSummary]) {
    if chats.is_empty() {
        println!("{}", "No chats yet".yellow());
        return;
    }
    println!("{}", format!("Chats ({})", chats.len()).bright_cyan().bold());
    println!("{}", "─".repeat(60).dimmed());
    for chat in chats {
        println!(
            "  {} {} ↔ {} about {}",
            chat.room_id.dimmed(),
            chat.sender.cyan(),
            chat.recipient.cyan(),
            chat.product_title.bright_white()
        );
        if !chat.message.is_empty() {
            println!("      {}", chat.message);
        }
    }
}

fn set_theme(store: &LocalStore, mode: Option<&str>) -> crate::Result<()> {
    match mode {
        Some("dark") => store.set_dark(true)?,
        Some("light") => store.set_dark(false)?,
        Some(other) => {
            return Err(BazaarError::Validation(format!(
                "theme must be dark or light, got {}",
                other
            )))
        }
        None => {}
    }
    let label = if store.is_dark()? { "dark" } else { "light" };
    println!("Theme: {}", label.cyan());
    Ok(())
}
