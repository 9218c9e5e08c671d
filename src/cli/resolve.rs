use std::time::Duration;

use tabled::Table;

use crate::{
    cli::{open_session, spinner},
    error,
    tidal::CatalogResolver,
    types::MediaKind,
    utils,
};

pub async fn resolve(id: String, kind: MediaKind) {
    let resolver = CatalogResolver::new(open_session().await);

    let pb = spinner(&format!("Resolving {kind} {id}..."));
    pb.enable_steady_tick(Duration::from_millis(100));

    if kind == MediaKind::Track {
        let descriptor = resolver.resolve(&id, kind).await;
        pb.finish_and_clear();
        match descriptor {
            Ok(descriptor) => println!("{}", Table::new(utils::descriptor_rows(&descriptor))),
            Err(e) => error!("{}", e),
        }
        return;
    }

    let tracks = resolver.tracks_of(&id, kind).await;
    pb.finish_and_clear();
    match tracks {
        Ok(tracks) => println!(
            "{kind} {id}: {count} tracks\n{table}",
            count = tracks.len(),
            table = Table::new(utils::track_rows(&tracks))
        ),
        Err(e) => error!("{}", e),
    }
}
