use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use prettytable::{Cell, Row, Table};
use std::io::{self, Write};

use mangrov::client::{require_session, ApiClient, Session};
use mangrov::models::{SwipeResponse, Trade};
use mangrov::optimistic::Optimistic;
use mangrov::trades::{QueueMode, TradeQueue};

#[derive(Parser)]
#[command(name = "mangrov")]
#[command(about = "Buy, sell and barter on Mangrov from the terminal", long_about = None)]
struct Cli {
    #[arg(long, env = "MANGROV_API_URL", default_value = "http://localhost:3000", help = "API base URL")]
    api: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Interests,
    Random,
}

#[derive(Clone, Copy, ValueEnum)]
enum Sort {
    Newest,
    Oldest,
    PriceAsc,
    PriceDesc,
    Popular,
}

impl Sort {
    fn as_param(&self) -> &'static str {
        match self {
            Sort::Newest => "newest",
            Sort::Oldest => "oldest",
            Sort::PriceAsc => "price_asc",
            Sort::PriceDesc => "price_desc",
            Sort::Popular => "popular",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create a new account")]
    Signup {
        #[arg(short, long, help = "Email address")]
        email: String,

        #[arg(short, long, help = "Password (8+ chars, uppercase, number, symbol)")]
        password: String,

        #[arg(short, long, help = "Username (letters, numbers, underscores)")]
        username: String,

        #[arg(short, long, help = "Display name")]
        name: String,
    },

    #[command(about = "Sign in to your account")]
    Signin {
        #[arg(short, long, help = "Email address")]
        email: String,

        #[arg(short, long, help = "Password")]
        password: String,
    },

    #[command(about = "Sign out")]
    Signout,

    #[command(about = "Show the signed-in user")]
    Whoami,

    #[command(about = "Show a profile, yours by default")]
    Profile {
        #[arg(help = "Username to look up")]
        username: Option<String>,
    },

    #[command(about = "Replace your interests")]
    Interests {
        #[arg(help = "Interests (comma-separated)")]
        interests: String,
    },

    #[command(about = "Browse posts")]
    Feed {
        #[arg(short, long, help = "Only this niche")]
        niche: Option<String>,

        #[arg(short, long, help = "Search title and description")]
        search: Option<String>,

        #[arg(long, value_enum, default_value = "newest")]
        sort: Sort,

        #[arg(short, long, default_value_t = 1)]
        page: usize,
    },

    #[command(about = "Post an item for sale")]
    Sell {
        #[arg(short, long)]
        title: String,

        #[arg(short, long, default_value = "")]
        description: String,

        #[arg(short, long)]
        price: f64,

        #[arg(short, long, default_value_t = 1)]
        quantity: u32,

        #[arg(short, long)]
        niche: String,
    },

    #[command(about = "Like or unlike a post")]
    Like {
        #[arg(help = "Post ID")]
        post_id: String,
    },

    #[command(about = "List an item for barter")]
    List {
        #[arg(short, long)]
        title: String,

        #[arg(short, long, default_value = "")]
        description: String,

        #[arg(short, long)]
        niche: String,

        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },

    #[command(about = "Swipe through trade items")]
    Swipe {
        #[arg(short, long, value_enum, default_value = "interests")]
        mode: Mode,
    },

    #[command(about = "Offer one of your items for a trade item")]
    Offer {
        #[arg(help = "Trade ID you want")]
        trade_id: String,

        #[arg(help = "Your trade ID to offer")]
        offered_item: String,
    },

    #[command(about = "List your trade matches")]
    Matches,

    #[command(about = "List your chats")]
    Chats,

    #[command(about = "Send a message to a user")]
    Send {
        #[arg(help = "Username to message")]
        username: String,

        #[arg(help = "Message text")]
        text: String,
    },

    #[command(about = "Read a chat, marking its messages read")]
    Messages {
        #[arg(help = "Chat ID")]
        chat_id: String,
    },

    #[command(about = "Show unread message counts")]
    Unread,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run_command(&cli.api, cli.command).await {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

fn signed_in(api: &str) -> Result<(Session, ApiClient)> {
    let session = require_session(&Session::path())?;
    let client = ApiClient::new(api, Some(session.token.clone()));
    Ok((session, client))
}

async fn run_command(api: &str, command: Commands) -> Result<()> {
    match command {
        Commands::Signup { email, password, username, name } => {
            let client = ApiClient::new(api, None);
            let auth = client.sign_up(&email, &password, &username, &name).await?;
            start_session(&auth.user.id, &auth.user.username, &auth.token)?;
            println!("✅ Account created! Welcome, {}.", auth.user.display_name);
            if let Some(code) = auth.verification_code {
                println!("📧 Verification code: {}", code);
            }
        }
        Commands::Signin { email, password } => {
            let client = ApiClient::new(api, None);
            let auth = client.sign_in(&email, &password).await?;
            start_session(&auth.user.id, &auth.user.username, &auth.token)?;
            println!("✅ Signed in as {}", auth.user.username);
            if !auth.email_verified {
                println!("💡 Your email is not verified yet");
            }
        }
        Commands::Signout => {
            if let Ok((_, client)) = signed_in(api) {
                // The local session goes either way.
                if let Err(e) = client.sign_out().await {
                    eprintln!("⚠️  Server sign-out failed: {:#}", e);
                }
            }
            Session::clear_at(&Session::path())?;
            println!("✅ Signed out");
        }
        Commands::Whoami => match Session::load_from(&Session::path()) {
            Some(session) => {
                println!("👤 Signed in as: {}", session.username);
                println!("🆔 User ID: {}", session.user_id);
            }
            None => println!("❌ Not signed in"),
        },
        Commands::Profile { username } => {
            let (_, client) = signed_in(api)?;
            let user = match username {
                Some(name) => client.user(&name).await?,
                None => client.me().await?,
            };
            println!("👤 {} (@{})", user.display_name, user.username);
            if let Some(country) = &user.country {
                println!("   🌍 {}", country);
            }
            if let Some(language) = &user.language {
                println!("   🗣️  {}", language);
            }
            if !user.interests.is_empty() {
                println!("   🏷️  {}", user.interests.join(", "));
            }
        }
        Commands::Interests { interests } => {
            let (_, client) = signed_in(api)?;
            let list: Vec<String> = interests
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            let user = client
                .update_profile(&serde_json::json!({ "interests": list }))
                .await?;
            println!("✅ Interests: {}", user.interests.join(", "));
        }
        Commands::Feed { niche, search, sort, page } => {
            let (_, client) = signed_in(api)?;
            let mut query = vec![("sort", sort.as_param().to_string()), ("page", page.to_string())];
            if let Some(niche) = niche {
                query.push(("niche", niche));
            }
            if let Some(search) = search {
                query.push(("search", search));
            }
            let result = client.feed(&query).await?;

            if result.posts.is_empty() {
                println!("📭 No posts found.");
                return Ok(());
            }

            let mut table = Table::new();
            table.add_row(Row::new(vec![
                Cell::new("ID"),
                Cell::new("Title"),
                Cell::new("Price"),
                Cell::new("Niche"),
                Cell::new("Likes"),
            ]));
            for post in &result.posts {
                table.add_row(Row::new(vec![
                    Cell::new(short_id(&post.id)),
                    Cell::new(&post.title),
                    Cell::new(&format!("{:.2}", post.price)),
                    Cell::new(&post.niche),
                    Cell::new(&post.likes.len().to_string()),
                ]));
            }
            table.printstd();
            println!("Page {} · {} posts{}", result.page, result.total, if result.has_more { " · more available" } else { "" });
        }
        Commands::Sell { title, description, price, quantity, niche } => {
            let (_, client) = signed_in(api)?;
            let post = client
                .create_post(&serde_json::json!({
                    "title": title,
                    "description": description,
                    "price": price,
                    "quantity": quantity,
                    "niche": niche,
                }))
                .await?;
            println!("✅ Posted '{}' ({})", post.title, post.id);
        }
        Commands::Like { post_id } => {
            let (session, client) = signed_in(api)?;
            let post = client.post(&post_id).await?;
            let mut liked = Optimistic::new(post.is_liked_by(&session.user_id));
            let next = !*liked.get();

            println!("{} {}", if next { "❤️" } else { "🤍" }, post.title);
            match liked.apply(next, || client.toggle_like(&post_id)).await {
                Ok(response) => println!("   {} like(s)", response.like_count),
                Err(e) => {
                    println!("{} {} (reverted)", if *liked.get() { "❤️" } else { "🤍" }, post.title);
                    return Err(e);
                }
            }
        }
        Commands::List { title, description, niche, quantity } => {
            let (_, client) = signed_in(api)?;
            let trade = client
                .create_trade(&serde_json::json!({
                    "title": title,
                    "description": description,
                    "niche": niche,
                    "quantity": quantity,
                }))
                .await?;
            println!("✅ Listed '{}' for trade ({})", trade.title, trade.id);
        }
        Commands::Swipe { mode } => {
            let (_, client) = signed_in(api)?;
            let mode = match mode {
                Mode::Interests => QueueMode::Interests,
                Mode::Random => QueueMode::Random,
            };
            swipe(&client, mode).await?;
        }
        Commands::Offer { trade_id, offered_item } => {
            let (_, client) = signed_in(api)?;
            let outcome = client.offer_trade(&trade_id, &offered_item).await?;
            print_swipe(outcome.mutual, outcome.chat_id.as_deref());
        }
        Commands::Matches => {
            let (session, client) = signed_in(api)?;
            let list = client.matches().await?;
            if list.matches.is_empty() {
                println!("📭 No matches yet. Try 'mangrov swipe'");
                return Ok(());
            }

            let mut table = Table::new();
            table.add_row(Row::new(vec![
                Cell::new("Direction"),
                Cell::new("Their item"),
                Cell::new("Your item"),
                Cell::new("Status"),
            ]));
            for m in &list.matches {
                let outgoing = m.from_user == session.user_id;
                let (theirs, mine) = if outgoing {
                    (&m.to_item, &m.from_item)
                } else {
                    (&m.from_item, &m.to_item)
                };
                let status = if m.is_mutual() { "🤝 mutual" } else { "⏳ pending" };
                table.add_row(Row::new(vec![
                    Cell::new(if outgoing { "sent" } else { "received" }),
                    Cell::new(if theirs.is_empty() { "-" } else { short_id(theirs) }),
                    Cell::new(if mine.is_empty() { "-" } else { short_id(mine) }),
                    Cell::new(status),
                ]));
            }
            table.printstd();
        }
        Commands::Chats => {
            let (session, client) = signed_in(api)?;
            let chats = client.chats().await?;
            let unread = client.unread().await?;
            if chats.is_empty() {
                println!("📭 No conversations yet.");
                return Ok(());
            }

            let mut table = Table::new();
            table.add_row(Row::new(vec![
                Cell::new("Chat"),
                Cell::new("With"),
                Cell::new("Last message"),
                Cell::new("When"),
                Cell::new("Unread"),
            ]));
            for chat in &chats {
                let count = unread
                    .chats
                    .iter()
                    .find(|c| c.chat_id == chat.id)
                    .map_or(0, |c| c.count);
                let (text, when) = match &chat.last_message {
                    Some(last) => (
                        last.text.clone(),
                        last.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
                    ),
                    None => ("-".to_string(), "-".to_string()),
                };
                table.add_row(Row::new(vec![
                    Cell::new(&chat.id),
                    Cell::new(short_id(chat.other(&session.user_id).unwrap_or("?"))),
                    Cell::new(&text),
                    Cell::new(&when),
                    Cell::new(&count.to_string()),
                ]));
            }
            table.printstd();
        }
        Commands::Send { username, text } => {
            let (_, client) = signed_in(api)?;
            let other = client.user(&username).await?;
            let chat = client.open_chat(&other.id).await?;
            let message = client.send_message(&chat.id, &text).await?;
            println!("✅ Sent to @{} in chat {}", other.username, message.chat_id);
        }
        Commands::Messages { chat_id } => {
            let (session, client) = signed_in(api)?;
            let messages = client.messages(&chat_id).await?;
            if messages.is_empty() {
                println!("📭 No messages yet.");
                return Ok(());
            }
            for message in &messages {
                let who = if message.is_system_message {
                    "🔔"
                } else if message.sender_id == session.user_id {
                    "you"
                } else {
                    "them"
                };
                let when = message.timestamp.with_timezone(&Local).format("%H:%M");
                println!("[{}] {}: {}", when, who, message.text);
                if let Some(url) = &message.image_url {
                    println!("        🖼️  {}", url);
                }
                // Everything printed is on screen, so it counts as seen.
                if message.receiver_id == session.user_id && !message.read {
                    client.mark_read(&message.id).await?;
                }
            }
        }
        Commands::Unread => {
            let (_, client) = signed_in(api)?;
            let summary = client.unread().await?;
            println!("📬 {} unread", summary.total);
            for chat in &summary.chats {
                println!("   {} · {} · {}", chat.chat_id, chat.count, chat.last_text);
            }
        }
    }

    Ok(())
}

fn start_session(user_id: &str, username: &str, token: &str) -> Result<()> {
    Session {
        token: token.to_string(),
        user_id: user_id.to_string(),
        username: username.to_string(),
    }
    .save_to(&Session::path())
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn prompt(question: &str) -> Result<String> {
    print!("{}", question);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input).context("Failed to read input")?;
    Ok(input.trim().to_lowercase())
}

fn print_card(trade: &Trade, remaining: usize) {
    println!("\n═══════════════════════════════════════");
    println!("🔁 {}  ({} left)", trade.title, remaining);
    println!("🏷️  {}", trade.niche);
    if !trade.description.is_empty() {
        println!("📝 {}", trade.description);
    }
    if let Some(image) = &trade.image {
        println!("🖼️  {}", image);
    }
    println!("═══════════════════════════════════════");
}

fn print_swipe(mutual: bool, chat_id: Option<&str>) {
    if mutual {
        println!("🤝 It's a match!");
        if let Some(chat) = chat_id {
            println!("💬 Chat opened: mangrov messages {}", chat);
        }
    } else {
        println!("✅ Proposal recorded");
    }
}

/// Reports a like and moves to the next card whether or not it was recorded.
fn settle_like(queue: &mut TradeQueue, result: Result<SwipeResponse>) {
    match result {
        Ok(outcome) => print_swipe(outcome.mutual, outcome.chat_id.as_deref()),
        Err(e) => println!("⚠️  Like not recorded: {:#}", e),
    }
    queue.advance();
}

async fn swipe(client: &ApiClient, mode: QueueMode) -> Result<()> {
    let mut queue = TradeQueue::new(client.trade_queue(mode).await?);

    while let Some(candidate) = queue.current().cloned() {
        print_card(&candidate, queue.remaining());

        match prompt("👉 [l]ike, [p]ass and offer, [q]uit: ")?.as_str() {
            "l" | "like" => {
                settle_like(&mut queue, client.like_trade(&candidate.id).await);
            }
            "p" | "pass" => {
                let mine = client.picker().await?;
                if mine.is_empty() {
                    println!("💡 List something first: mangrov list -t <title> -n <niche>");
                    continue;
                }
                for (i, item) in mine.iter().enumerate() {
                    println!("   {}. {}", i + 1, item.title);
                }
                let choice = prompt("Offer which item? (number, empty to cancel): ")?;
                if choice.is_empty() {
                    continue;
                }
                let Some(offered) = choice.parse::<usize>().ok().and_then(|n| n.checked_sub(1)).and_then(|i| mine.get(i)) else {
                    println!("⚠️  No item {}", choice);
                    continue;
                };
                let outcome = client.offer_trade(&candidate.id, &offered.id).await?;
                print_swipe(outcome.mutual, outcome.chat_id.as_deref());
                queue.advance();
            }
            "q" | "quit" => return Ok(()),
            other => println!("⚠️  Unknown choice '{}'", other),
        }
    }

    if queue.is_exhausted() {
        println!("\n📭 You've seen everything for now.");
    }
    Ok(())
}
