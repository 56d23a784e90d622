use crate::CliConfig;
use happenstance::{GroupResolver, ParseError, PredicateTree, ZoneId, parse_where};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            if self.enabled { format!("{}{}{}", color, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", BOLD, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", DIM, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }
    }
}

pub fn print_run(config: &CliConfig) -> i32 {
    let palette = ansi::Palette::new(config.color);
    println!("\n{}", palette.bold(palette.paint(format!("⚙  WHEN: \"{}\"", config.when), ansi::CYAN)));

    println!("\n{}", palette.paint("━━━ Predicate Tree ━━━", ansi::GRAY));
    let tree = match PredicateTree::parse(&config.when) {
        Ok(tree) => tree,
        Err(err) => {
            print_clause_error(&config.when, &err, &palette);
            return 1;
        }
    };
    for line in tree.render().lines() {
        println!("  {line}");
    }

    println!("\n{}", palette.paint("━━━ Atoms ━━━", ansi::GRAY));
    if tree.atoms().is_empty() {
        println!("{}", palette.dim("  No atoms"));
    }
    for (idx, atom) in tree.atoms().iter().enumerate() {
        println!(
            "  {} {} {} {}",
            palette.paint(format!("[{idx}]"), ansi::GRAY),
            palette.bold(palette.paint(&atom.type_name, ansi::GREEN)),
            palette.dim("│"),
            palette.paint(format!("byte {}", atom.pos), ansi::YELLOW),
        );
        if !atom.args.is_empty() {
            println!("      {} {}", palette.dim("args:"), palette.paint(atom.args.to_string(), ansi::BLUE));
        }
    }

    let mut resolver = GroupResolver::new();
    for (name, expr) in &config.groups {
        if let Err(err) = resolver.define_expr(name.clone(), expr) {
            println!("\n{}", palette.paint(format!("━━━ Group: {name} ━━━"), ansi::GRAY));
            print_clause_error(expr, &err, &palette);
            return 1;
        }
    }
    if !config.groups.is_empty() {
        println!("\n{}", palette.paint("━━━ Groups ━━━", ansi::GRAY));
        let names: Vec<String> = resolver.group_names().iter().map(|n| n.to_string()).collect();
        for name in names {
            let members = sorted(resolver.resolve(&name));
            println!(
                "  {} {} {}",
                palette.paint(&name, ansi::BLUE),
                palette.dim("→"),
                palette.paint(format!("{{{}}}", members.join(", ")), ansi::GREEN),
            );
        }
    }

    for clause in &config.wheres {
        println!("\n{}", palette.paint(format!("━━━ WHERE: \"{clause}\" ━━━"), ansi::GRAY));
        let terms = match parse_where(clause) {
            Ok(terms) => terms,
            Err(err) => {
                print_clause_error(clause, &err, &palette);
                return 1;
            }
        };
        for term in &terms {
            let sign = match term.sign {
                happenstance::Sign::Add => palette.paint("+", ansi::GREEN),
                happenstance::Sign::Subtract => palette.paint("-", ansi::RED),
            };
            let kind = if resolver.is_group(&term.ident) { "group" } else { "zone" };
            println!("  {sign} {} {}", palette.bold(&term.ident), palette.dim(format!("({kind})")));
        }
        let zones = sorted(resolver.resolve_terms(&terms));
        println!(
            "  {} {}",
            palette.dim("resolves to:"),
            palette.paint(format!("{{{}}}", zones.join(", ")), ansi::GREEN),
        );
    }

    println!();
    0
}

fn print_clause_error(src: &str, err: &ParseError, palette: &ansi::Palette) {
    println!("  {}", palette.paint(err.to_string(), ansi::RED));
    if let Some(pos) = err.position() {
        println!("  {}", palette.dim(src));
        println!("  {}{}", " ".repeat(pos), palette.paint("^", ansi::RED));
    }
}

fn sorted(zones: std::collections::HashSet<ZoneId>) -> Vec<String> {
    let mut out: Vec<String> = zones.into_iter().map(|z| z.to_string()).collect();
    out.sort();
    out
}
