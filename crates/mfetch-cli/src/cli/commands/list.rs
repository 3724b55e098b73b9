//! `mfetch list` – show the built-in catalog.

use mfetch_core::catalog::{Catalog, ROOT_GROUP};

fn render(catalog: &Catalog) -> String {
    let mut out = String::from("Models:\n");
    for (alias, group) in catalog.aliases() {
        out.push_str(&format!("  {:<10} {}\n", alias, group));
    }
    out.push_str("\nFiles:\n");
    for group in catalog.group_names() {
        if group == ROOT_GROUP {
            out.push_str("  (destination root)\n");
        } else {
            out.push_str(&format!("  {}/\n", group));
        }
        for file in catalog.files(group).unwrap_or_default() {
            out.push_str(&format!("    {}\n", file));
        }
    }
    out
}

pub fn run_list() {
    print!("{}", render(&Catalog::llama2()));
}
