use gnat::data::Descriptor;
use gnat::database::DescriptorFile;
use gnat::metric::MetricKind;
use gnat::tree::{Gnat, GnatConfig};

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, StatusCode};
use hyper::server::Server;
use log::{info, warn};
use serde_json::json;

type Tree = Gnat<DescriptorFile, MetricKind>;

/// Read-only after load, so every request shares it without locking
struct AppState {
    tree: Tree,
    config: GnatConfig,
}

#[derive(Debug, PartialEq)]
enum RouteError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl RouteError {

    fn status(&self) -> StatusCode {
        match self {
            RouteError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RouteError::NotFound(_) => StatusCode::NOT_FOUND,
            RouteError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &str {
        match self {
            RouteError::BadRequest(m) | RouteError::NotFound(m) | RouteError::Internal(m) => m,
        }
    }
}

impl From<gnat::Error> for RouteError {
    fn from(e: gnat::Error) -> Self {
        RouteError::Internal(e.to_string())
    }
}

async fn handle(req: Request<Body>, state: Arc<AppState>) -> Result<Response<Body>, Infallible> {

    let path = req.uri().path().to_string();

    //queries read the descriptor file, keep them off the reactor threads
    let routed = tokio::task::spawn_blocking(move || route(&path, &state)).await;

    let result = match routed {
        Ok(result) => result,
        Err(e) => Err(RouteError::Internal(e.to_string())),
    };

    let response = match result {
        Ok(body) => Response::new(Body::from(body)),
        Err(e) => {
            warn!("{:?}", &e);
            let body = json!({ "error": e.message() }).to_string();
            let mut response = Response::new(Body::from(body));
            *response.status_mut() = e.status();
            response
        },
    };

    return Ok(response);
}

/// `/range/<radius>/<coords>`, `/neighbors/<n>/<coords>` and `/stats`, coords comma separated
fn route(path: &str, state: &AppState) -> Result<String, RouteError> {

    let items: Vec<&str> = path.trim_matches('/').split('/').collect();

    return match items.as_slice() {
        ["stats"] => stats(state),
        ["range", radius, coords] => query_range(radius, coords, state),
        ["neighbors", num_nn, coords] => query_neighbors(num_nn, coords, state),
        _ => Err(RouteError::NotFound(format!("method not recognized: {}", path))),
    };
}

fn parse_descriptor(coords: &str, dim: usize) -> Result<Descriptor, RouteError> {

    return Descriptor::from_csv_line(coords, dim).map_err(|e| RouteError::BadRequest(format!("invalid descriptor: {}", e)));
}

fn stats(state: &AppState) -> Result<String, RouteError> {

    let tree_stats = state.tree.stats()?;

    let body = json!({
        "config": &state.config,
        "stats": tree_stats,
    });

    return Ok(body.to_string());
}

fn query_range(radius: &str, coords: &str, state: &AppState) -> Result<String, RouteError> {

    let radius = radius.parse::<f64>().map_err(|_| RouteError::BadRequest(format!("invalid radius: {}", radius)))?;
    let descriptor = parse_descriptor(coords, state.config.dim)?;

    let hits = state.tree.query(&descriptor, radius)?;

    let body = json!({
        "query": descriptor.data,
        "radius": radius,
        "hits": hits,
    });

    return Ok(body.to_string());
}

fn query_neighbors(num_nn: &str, coords: &str, state: &AppState) -> Result<String, RouteError> {

    let num_nn = num_nn.parse::<usize>().map_err(|_| RouteError::BadRequest(format!("invalid neighbor count: {}", num_nn)))?;
    let descriptor = parse_descriptor(coords, state.config.dim)?;

    let nn = state.tree.nearest_neighbors(&descriptor, num_nn)?;

    let body = json!({
        "query": descriptor.data,
        "num_nn": num_nn,
        "hits": nn.neighbors,
    });

    return Ok(body.to_string());
}

use clap::Parser;
#[derive(Parser, Debug)] #[command(author, version, about, long_about = None)]
struct Args {

    //Tree directory written by the builder
    #[arg(short, long)]
    directory: String,

    #[arg(short, long, default_value_t = 3000)]
    port: u16,
}

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {

    env_logger::init();

    let args = Args::parse();

    let (tree, config) = Tree::read_from_directory(&args.directory)?;
    let state = Arc::new(AppState { tree, config });

    // For every connection, we must make a `Service` to handle all
    // incoming HTTP requests on said connection.
    let make_svc = make_service_fn(move |_conn| {
        let state = state.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| {
            let state = state.clone();
            handle(req, state)
        }))}
    });

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));

    let server = Server::bind(&addr).serve(make_svc);

    info!("Listening on http://{}", addr);

    server.await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use serde_json::Value;

    fn test_state(name: &str) -> AppState {

        let directory = std::env::temp_dir().join(format!("gnat_server_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&directory);
        std::fs::create_dir_all(&directory).unwrap();

        let config = GnatConfig {
            directory: directory.to_string_lossy().to_string(),
            dim: 2,
            branch_factor: 3,
            leaf_capacity: 4,
            metric: MetricKind::Euclidean,
        };

        let mut database = DescriptorFile::create(config.get_database_filename(), config.dim).unwrap();
        database.add_descriptor(&Descriptor::from_vec(vec![0.0, 0.0])).unwrap();
        database.add_descriptor(&Descriptor::from_vec(vec![3.0, 4.0])).unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let data = vec![rng.gen_range(10.0..20.0), rng.gen_range(10.0..20.0)];
            database.add_descriptor(&Descriptor::from_vec(data)).unwrap();
        }

        let tree = Gnat::build_with_config(database, config.metric, &config).unwrap();
        tree.write_to_directory(&config).unwrap();

        let (tree, config) = Tree::read_from_directory(&config.directory).unwrap();

        return AppState { tree, config };
    }

    fn cleanup(state: &AppState) {
        std::fs::remove_dir_all(&state.config.directory).unwrap();
    }

    #[test]
    fn range_route() {

        let state = test_state("range");

        let body: Value = serde_json::from_str(&route("/range/5.5/0,0", &state).unwrap()).unwrap();
        assert_eq!(body["hits"], json!([0, 1]));

        //strict boundary
        let body: Value = serde_json::from_str(&route("/range/5/0,0", &state).unwrap()).unwrap();
        assert_eq!(body["hits"], json!([0]));

        cleanup(&state);
    }

    #[test]
    fn neighbors_route() {

        let state = test_state("neighbors");

        let body: Value = serde_json::from_str(&route("/neighbors/2/3,4", &state).unwrap()).unwrap();
        let hits = body["hits"].as_array().unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0]["key"], json!(1));
        assert_eq!(hits[1]["key"], json!(0));
        assert_eq!(hits[1]["distance"], json!(5.0));

        cleanup(&state);
    }

    #[test]
    fn bad_requests() {

        let state = test_state("bad");

        assert!(matches!(route("/neighbors/2/1,2,3", &state), Err(RouteError::BadRequest(_))));
        assert!(matches!(route("/neighbors/x/1,2", &state), Err(RouteError::BadRequest(_))));
        assert!(matches!(route("/range/abc/1,2", &state), Err(RouteError::BadRequest(_))));
        assert!(matches!(route("/smiles/CCO", &state), Err(RouteError::NotFound(_))));
        assert_eq!(RouteError::NotFound("x".to_string()).status(), StatusCode::NOT_FOUND);

        let body: Value = serde_json::from_str(&route("/stats", &state).unwrap()).unwrap();
        assert_eq!(body["stats"]["num_samples"], json!(52));
        assert_eq!(body["config"]["branch_factor"], json!(3));

        cleanup(&state);
    }
}
