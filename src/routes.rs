use crate::{
    api::{attendance, sync},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::web;
use std::sync::Arc;

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
        let per_ms = if requests_per_min == 0 {
            1
        } else {
            60_000 / requests_per_min as u64
        };
        let cfg = GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(requests_per_min)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .unwrap();
        Governor::new(&cfg)
    }

    // Scan-facing endpoints take the kiosk traffic; everything else is staff
    let scan_limiter = Arc::new(build_limiter(config.rate_scan_per_min));

    cfg.service(
        web::scope(&config.api_prefix).service(
            web::scope("/attendance")
                .service(
                    web::resource("/scan")
                        .wrap(scan_limiter.clone())
                        .route(web::post().to(attendance::scan)),
                )
                .service(
                    web::resource("/roll")
                        .wrap(scan_limiter.clone())
                        .route(web::post().to(attendance::roll)),
                )
                .service(web::resource("/manual").route(web::post().to(attendance::manual)))
                .service(web::resource("/sync").route(web::post().to(sync::sync_batch)))
                .service(web::resource("/day-end").route(web::post().to(sync::day_end)))
                .service(
                    web::resource("/{student_id}/{subject_id}/{date}")
                        .route(web::get().to(attendance::find)),
                ),
        ),
    );
}
